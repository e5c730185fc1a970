//! Lazy handles into not-yet-computed job outputs.
//!
//! An [`OutputReference`] is a pair `(uuid, path)`. It never evaluates
//! anything — `.field(...)`/`.index(...)` just return a new reference with
//! the access appended to `path`. Rust has no runtime attribute/index
//! interception to exploit, so the lazy-accessor behavior is modeled as an
//! explicit builder instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of an [`OutputReference`]'s path: an index into a sequence, or
/// a key lookup into a mapping/typed-object's fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Key(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        PathSegment::Key(s)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Key(k) => write!(f, ".{k}"),
        }
    }
}

/// A lazy `(uuid, path)` handle into a job's output. Value-equal iff both
/// parts match; attribute/index access never evaluates anything (see
/// the "reference purity" law: no side effects, no evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputReference {
    pub uuid: Uuid,
    pub path: Vec<PathSegment>,
    /// Names of stores this reference should be resolved against, if the
    /// caller wants to restrict resolution to a subset of auxiliary stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_stores: Option<Vec<String>>,
}

impl OutputReference {
    pub fn new(uuid: Uuid) -> Self {
        OutputReference {
            uuid,
            path: Vec::new(),
            source_stores: None,
        }
    }

    /// Append a key lookup, returning a new reference. No evaluation occurs.
    pub fn field(&self, key: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(PathSegment::Key(key.into()));
        OutputReference {
            uuid: self.uuid,
            path,
            source_stores: self.source_stores.clone(),
        }
    }

    /// Append an index lookup, returning a new reference. No evaluation occurs.
    pub fn index(&self, i: usize) -> Self {
        let mut path = self.path.clone();
        path.push(PathSegment::Index(i));
        OutputReference {
            uuid: self.uuid,
            path,
            source_stores: self.source_stores.clone(),
        }
    }

    /// Restrict resolution of this reference to the named auxiliary stores.
    pub fn from_stores(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.source_stores = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)?;
        for segment in &self.path {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

//! A single unit of work in a flow: a named callable plus its arguments,
//! routing, and bookkeeping metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reference::OutputReference;
use crate::value::Value;

/// A routing table from a top-level output key to the auxiliary store its
/// subtree should additionally be written to. A key absent from
/// this map stays inline in the main record. Matching is exact-key rather
/// than prefix or glob.
pub type StoreNames = BTreeMap<String, String>;

/// A job awaiting or having undergone execution.
///
/// `uuid` identifies the job for its entire lifetime, including across a
/// true replace, which keeps the uuid of whichever job it swaps
/// in for. `index` is this job's position in the flow's flattened
/// execution order at the time it was last (re)inserted; self-replacing a
/// job bumps its own index rather than minting a new uuid (see
/// `DESIGN.md` for the full writeup of this Open Question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    /// Version counter for this uuid; starts at 1 and is bumped only when
    /// a job self-replaces.
    pub index: u32,
    pub name: String,
    /// Name of the function this job invokes, resolved against a
    /// function registry at scheduling time.
    pub callable: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
    /// If set, the job's output is validated against this schema before
    /// being stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub store_names: StoreNames,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Parent flow uuids this job has been nested under, outermost first.
    /// Used to reconstruct a dotted name for logging/diagnostics.
    #[serde(default)]
    pub hosts: Vec<Uuid>,
}

impl Job {
    pub fn new(name: impl Into<String>, callable: impl Into<String>) -> Self {
        Job {
            uuid: Uuid::new_v4(),
            index: 1,
            name: name.into(),
            callable: callable.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            output_schema: None,
            store_names: StoreNames::new(),
            metadata: BTreeMap::new(),
            hosts: Vec::new(),
        }
    }

    /// Replace this job's uuid, including the uuid its `.output()`
    /// reference carries. Only meaningful before the job is handed to a
    /// scheduler.
    pub fn set_uuid(&mut self, new_uuid: Uuid) {
        self.uuid = new_uuid;
    }

    /// An [`OutputReference`] to this job's `(uuid, index)` with an empty
    /// path. Cheap and side-effect free — no evaluation occurs until the
    /// scheduler resolves it.
    pub fn output(&self) -> OutputReference {
        OutputReference::new(self.uuid)
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Route the given top-level output keys to named auxiliary stores,
    /// e.g. `[("big", "blobs")]` moves the `"big"` subtree of this job's
    /// output into the `"blobs"` store at save time.
    pub fn with_store_names(
        mut self,
        routes: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.store_names = routes.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Recursively rewrite keyword arguments matching `matches`, replacing
    /// each matched value with `apply`'s result. A utility for
    /// higher-level callers; the engine itself never calls this.
    pub fn update_kwargs(
        &mut self,
        matches: impl Fn(&str, &Value) -> bool,
        apply: impl Fn(Value) -> Value,
    ) {
        for (key, value) in self.kwargs.iter_mut() {
            if matches(key, value) {
                let taken = std::mem::take(value);
                *value = apply(taken);
            }
        }
    }

    pub fn with_host(mut self, host: Uuid) -> Self {
        self.hosts.push(host);
        self
    }

    /// The dotted path `hosts[0]/hosts[1]/.../name` used in logs, with the
    /// bare name when this job has no hosting flow.
    pub fn qualified_name(&self) -> String {
        if self.hosts.is_empty() {
            self.name.clone()
        } else {
            format!(
                "{}/{}",
                self.hosts.iter().map(Uuid::to_string).collect::<Vec<_>>().join("/"),
                self.name
            )
        }
    }

    /// Every [`crate::reference::OutputReference`] reachable from this
    /// job's args and kwargs, used by the scheduler to compute readiness.
    pub fn input_refs(&self) -> Vec<crate::reference::OutputReference> {
        let mut refs = Vec::new();
        for arg in &self.args {
            refs.extend(crate::value::find_refs(arg));
        }
        for value in self.kwargs.values() {
            refs.extend(crate::value::find_refs(value));
        }
        refs
    }

    /// The distinct uuids of [`Job::input_refs`], used by the scheduler to
    /// compute readiness.
    pub fn input_uuids(&self) -> std::collections::BTreeSet<Uuid> {
        self.input_refs().into_iter().map(|r| r.uuid).collect()
    }
}

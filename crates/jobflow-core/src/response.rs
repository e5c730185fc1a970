//! A job's return value: its output plus the dynamic graph-rewrite
//! directives it can hand back to the scheduler.
//!
//! A plain [`Value`] returned by a callable is treated as a `Response`
//! with only `output` set — everything else defaults to "do nothing
//! extra". The directive fields let a running job reshape the rest of the
//! flow before the scheduler moves on to the next wave.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flow::FlowChild;
use crate::job::Job;
use crate::value::Value;

/// Where a detour's children land in the scheduler's tie-break order among
/// otherwise-equally-ready jobs. Readiness itself is always data-driven —
/// this only matters when a detoured job and an existing sibling become
/// ready in the same round and the scheduler has to pick one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionPoint {
    /// Prefer running ahead of the returning job's existing siblings.
    AfterSelf,
    /// Prefer running behind the returning job's existing siblings.
    EndOfFlow,
}

impl Default for InsertionPoint {
    fn default() -> Self {
        InsertionPoint::AfterSelf
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// The value stored as this job's output. Required unless the
    /// response exists purely to issue directives and leave `output` null.
    #[serde(default)]
    pub output: Value,

    /// Insert `children` into the flow without replacing the returning job
    /// (which stays done). Every not-yet-run reference to the returning
    /// job's output is rewired onto `children`'s own projected output, the
    /// same redirection a true `replace` does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<Detour>,

    /// Append `children` to the end of the flow as new independent work,
    /// with no ordering relationship to the returning job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addition: Option<Addition>,

    /// Replace the returning job's slot with `child` entirely. A
    /// self-replace (`child`'s callable equal to the job's own) bumps the
    /// job's index and re-runs in place; any other replacement keeps the
    /// original uuid's dependents wired to the new child's output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<Replace>,

    /// Extra values to persist alongside `output`, keyed for lookup by
    /// name rather than path.
    #[serde(default)]
    pub stored_data: BTreeMap<String, Value>,

    /// Cancel the returning job's not-yet-started direct dependents.
    /// Jobs inserted by `detour`/`addition` on this same response are not
    /// retroactively cancelled (see `DESIGN.md`).
    #[serde(default)]
    pub stop_children: bool,

    /// Cancel the entire remaining flow once this wave finishes.
    #[serde(default)]
    pub stop_jobflow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detour {
    pub children: Vec<FlowChild>,
    #[serde(default)]
    pub at: InsertionPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addition {
    pub children: Vec<FlowChild>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replace {
    pub child: FlowChild,
}

impl Response {
    pub fn new(output: impl Into<Value>) -> Self {
        Response {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_detour(mut self, children: Vec<FlowChild>, at: InsertionPoint) -> Self {
        self.detour = Some(Detour { children, at });
        self
    }

    pub fn with_addition(mut self, children: Vec<FlowChild>) -> Self {
        self.addition = Some(Addition { children });
        self
    }

    pub fn with_replace(mut self, child: FlowChild) -> Self {
        self.replace = Some(Replace { child });
        self
    }

    pub fn with_stored(mut self, key: impl Into<String>, value: Value) -> Self {
        self.stored_data.insert(key.into(), value);
        self
    }

    pub fn stopping_children(mut self) -> Self {
        self.stop_children = true;
        self
    }

    pub fn stopping_jobflow(mut self) -> Self {
        self.stop_jobflow = true;
        self
    }

    /// True if this response is a self-replace: its `replace.child` is a
    /// job with the same `uuid` as `original`, meaning the engine should
    /// bump its index and re-run it in place rather than remap uuids.
    pub fn is_self_replace(&self, original: &Job) -> bool {
        matches!(
            &self.replace,
            Some(Replace { child: FlowChild::Job(job) }) if job.uuid == original.uuid
        )
    }
}

impl From<Value> for Response {
    fn from(output: Value) -> Self {
        Response::new(output)
    }
}

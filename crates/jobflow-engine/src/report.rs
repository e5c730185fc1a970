//! What a run hands back: one entry per attempted job, distinguishable as
//! done/cancelled/failed, plus the `uuid → {index → Response}`
//! mapping the run-locally entry point promises.

use std::collections::BTreeMap;

use jobflow_core::Response;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum JobStatus {
    Done(Response),
    Cancelled,
    Failed(String),
}

/// The per-uuid outcome of a `Manager::run`, keyed by the uuid's *final*
/// index — for most jobs this is their only index; for a self-replaced
/// job it's the index of the last rerun.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub(crate) outcomes: BTreeMap<Uuid, (u32, JobStatus)>,
}

impl RunReport {
    pub fn status(&self, uuid: Uuid) -> Option<&JobStatus> {
        self.outcomes.get(&uuid).map(|(_, status)| status)
    }

    pub fn index(&self, uuid: Uuid) -> Option<u32> {
        self.outcomes.get(&uuid).map(|(index, _)| *index)
    }

    pub fn is_done(&self, uuid: Uuid) -> bool {
        matches!(self.status(uuid), Some(JobStatus::Done(_)))
    }

    pub fn is_cancelled(&self, uuid: Uuid) -> bool {
        matches!(self.status(uuid), Some(JobStatus::Cancelled))
    }

    pub fn failure(&self, uuid: Uuid) -> Option<&str> {
        match self.status(uuid) {
            Some(JobStatus::Failed(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, u32, &JobStatus)> {
        self.outcomes.iter().map(|(uuid, (index, status))| (*uuid, *index, status))
    }

    /// The `uuid → {index → Response}` mapping the run-locally entry
    /// point returns — every job that completed successfully.
    pub fn responses(&self) -> BTreeMap<Uuid, BTreeMap<u32, Response>> {
        let mut out: BTreeMap<Uuid, BTreeMap<u32, Response>> = BTreeMap::new();
        for (uuid, (index, status)) in &self.outcomes {
            if let JobStatus::Done(response) = status {
                out.entry(*uuid).or_default().insert(*index, response.clone());
            }
        }
        out
    }
}

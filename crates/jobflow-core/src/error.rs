use uuid::Uuid;

use crate::reference::PathSegment;

/// The error kinds a Jobflow run can surface, per the engine's error design:
/// Jobs fail in isolation and are recorded; the scheduler itself aborts on
/// the remaining kinds (graph construction, persistence, resolution of a
/// *ready* job's own inputs).
#[derive(Debug, thiserror::Error)]
pub enum JobflowError {
    #[error("failed to serialize value: {0}")]
    Serialization(String),

    #[error(
        "could not resolve reference to job {uuid} at path {}{}",
        fmt_path(path),
        failing_index.map(|i| format!(" (failed at segment {i})")).unwrap_or_default()
    )]
    ReferenceResolution {
        uuid: Uuid,
        path: Vec<PathSegment>,
        failing_index: Option<usize>,
    },

    #[error("no output found for job {uuid} index {index:?}")]
    OutputNotFound { uuid: Uuid, index: Option<u32> },

    #[error("graph construction error: {0}")]
    GraphConstruction(String),

    #[error("unresolvable graph: no job is ready but {remaining} job(s) remain unfinished")]
    UnresolvableGraph { remaining: usize },

    #[error("job output failed schema validation: {0}")]
    SchemaViolation(String),

    #[error("job {uuid} (index {index}) failed: {source}")]
    JobFailure {
        uuid: Uuid,
        index: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub(crate) fn fmt_path(path: &[PathSegment]) -> String {
    path.iter().map(|s| s.to_string()).collect()
}

pub type Result<T> = std::result::Result<T, JobflowError>;

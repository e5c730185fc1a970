//! The storage capability Jobflow needs from a backend: record, fetch,
//! update, remove, and a handful of read-side queries used by the engine
//! to report progress and by CLIs to inspect a run.

use jobflow_core::{JobflowError, Result, Value};
use uuid::Uuid;

use crate::record::JobRecord;

/// A predicate over stored records, used by [`JobStore::query`]. Kept as a
/// closure rather than a query DSL since a single process is the only
/// caller — no wire format to design for it.
pub type Filter<'a> = dyn Fn(&JobRecord) -> bool + 'a;

/// The persistence surface a job store backend must provide.
///
/// Implementors back either the main store (every job's output) or one
/// of a flow's named auxiliary stores. The router in this crate is
/// the only thing that talks to more than one of these at once.
pub trait JobStore: Send + Sync {
    /// Open any underlying resource (file handles, connections). Called
    /// once before first use; a no-op for purely in-memory backends.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release any underlying resource. A no-op for purely in-memory backends.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn update(&self, record: JobRecord) -> Result<()>;

    fn query_one(&self, uuid: Uuid) -> Result<Option<JobRecord>>;

    /// Fetch every record matching `filter`, in no particular order.
    fn query(&self, filter: &Filter<'_>) -> Result<Vec<JobRecord>>;

    fn remove(&self, uuid: Uuid) -> Result<()>;

    fn count(&self) -> Result<usize>;

    /// The distinct values a given top-level output field takes across
    /// every stored record, e.g. to list the set of job names that have
    /// run. Records whose output isn't a mapping, or that lack the field,
    /// are skipped.
    fn distinct(&self, field: &str) -> Result<Vec<Value>>;
}

/// Fetch `uuid`'s output, or the matching [`JobflowError::OutputNotFound`]
/// if the backend has nothing for it. Shared by every backend's
/// `get_output` so the error shape stays consistent.
pub(crate) fn output_or_not_found(
    store: &dyn JobStore,
    uuid: Uuid,
) -> Result<Value> {
    match store.query_one(uuid)? {
        Some(record) if record.is_failure() => Err(JobflowError::OutputNotFound { uuid, index: Some(record.index) }),
        Some(record) => Ok(record.output),
        None => Err(JobflowError::OutputNotFound { uuid, index: None }),
    }
}

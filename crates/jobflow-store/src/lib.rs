//! Persistence for Jobflow runs: a [`JobStore`] capability trait, two
//! backends (in-memory and file-backed), and a [`StoreRouter`] that fans a
//! job's output out to its main store plus any named auxiliary stores it
//! requested.

pub mod file;
pub mod memory;
pub mod record;
pub mod router;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{blob_marker, is_blob_marker, JobRecord, BLOB_CLASS};
pub use router::{Load, StoreRouter};
pub use store::{Filter, JobStore};

//! Core data model for Jobflow: jobs, flows, lazy output references, the
//! self-describing value tree they exchange, and the directive-bearing
//! response a job hands back to the scheduler.
//!
//! This crate has no opinion on *how* jobs run or *where* their output is
//! stored — see `jobflow-store` for persistence and `jobflow-engine` for
//! scheduling. It only defines the shapes those crates operate on.

pub mod error;
pub mod flow;
pub mod job;
pub mod reference;
pub mod response;
pub mod value;

pub use error::{JobflowError, Result};
pub use flow::{Flow, FlowChild};
pub use job::Job;
pub use reference::{OutputReference, PathSegment};
pub use response::{Addition, Detour, InsertionPoint, Replace, Response};
pub use value::{decode, deref_path, encode, find_refs, map_refs, resolve_refs, TypeRegistry, TypedObject, Value};

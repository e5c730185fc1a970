//! Scheduling for Jobflow: resolves a [`jobflow_core::Flow`]'s jobs against
//! a [`FunctionRegistry`], persists their output through a
//! [`jobflow_store::StoreRouter`], and applies the graph-rewrite
//! directives they hand back.
//!
//! `jobflow-core` and `jobflow-store` define the shapes this crate
//! operates on; this crate is the only one with an opinion on execution
//! order.

pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod report;
pub mod schema;

pub use config::{Config, Parallelism};
pub use error::{EngineError, Result};
pub use manager::{Manager, IDENTITY_CALLABLE};
pub use registry::{FunctionRegistry, JobError, JobFn};
pub use report::{JobStatus, RunReport};

use jobflow_core::Flow;
use jobflow_store::StoreRouter;

/// Run `flow` to completion sequentially against `registry` and `store`
/// and return its report — the convenience entry point for a
/// host that doesn't need a longer-lived `Manager` or bounded parallelism.
pub fn run_locally(flow: &Flow, registry: &FunctionRegistry, store: &StoreRouter) -> Result<RunReport> {
    Manager::new(registry, store, Config::default()).run(flow)
}

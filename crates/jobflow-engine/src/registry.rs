//! The function registry a job's `callable` name resolves against at run
//! time — the static-Rust stand-in for a dynamic-language runtime
//! decorator, generalized from a trait-object executor abstraction ("run
//! a subprocess") to "invoke a registered Rust closure."

use std::collections::BTreeMap;
use std::sync::Arc;

use jobflow_core::{Response, Value};

pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// A callable a job can invoke. Implemented automatically for any
/// `Fn(&[Value], &BTreeMap<String, Value>) -> Result<Response, JobError>`
/// closure, so most registrations are just `registry.register("name", |args, kwargs| ...)`.
pub trait JobFn: Send + Sync {
    fn call(&self, args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Response, JobError>;
}

impl<F> JobFn for F
where
    F: Fn(&[Value], &BTreeMap<String, Value>) -> Result<Response, JobError> + Send + Sync,
{
    fn call(&self, args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Response, JobError> {
        self(args, kwargs)
    }
}

/// A table of registered callables, supplied to a [`crate::Manager`] so it
/// can resolve each job's `callable` name at scheduling time.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn JobFn>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: impl JobFn + 'static) {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobFn>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

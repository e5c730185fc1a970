//! A small set of example callables — a stand-in for whatever functions a
//! real host application would register, just enough to run a flow
//! description out of the box.

use jobflow_core::{Response, Value};
use jobflow_engine::{FunctionRegistry, JobError};

/// `add`: sums every numeric `args` entry.
fn add(args: &[Value], _kwargs: &std::collections::BTreeMap<String, Value>) -> Result<Response, JobError> {
    let total: f64 = args.iter().filter_map(Value::as_f64).sum();
    Ok(Response::new(Value::from(total)))
}

/// `sum_numbers`: sums a single `Value::Sequence` of numbers, passed as
/// the sole argument (the fan-in shape S2 exercises).
fn sum_numbers(args: &[Value], _kwargs: &std::collections::BTreeMap<String, Value>) -> Result<Response, JobError> {
    let Some(items) = args.first().and_then(Value::as_sequence) else {
        return Err("sum_numbers expects a sequence argument".into());
    };
    let total: f64 = items.iter().filter_map(Value::as_f64).sum();
    Ok(Response::new(Value::from(total)))
}

/// `time`: returns the current Unix timestamp in seconds, with no
/// dependency on its arguments — useful as a no-input source job.
fn time(_args: &[Value], _kwargs: &std::collections::BTreeMap<String, Value>) -> Result<Response, JobError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| e.to_string())?;
    Ok(Response::new(Value::from(now.as_secs() as i64)))
}

/// Registers every demo callable under its spec name.
pub fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("add", add);
    registry.register("sum_numbers", sum_numbers);
    registry.register("time", time);
    registry
}

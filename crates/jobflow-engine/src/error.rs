//! The engine's own error surface: every `jobflow-core` error plus the
//! one failure mode specific to scheduling — a job naming a callable no
//! function was ever registered for.

use jobflow_core::JobflowError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] JobflowError),

    #[error("no function registered for callable '{0}'")]
    UnknownCallable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

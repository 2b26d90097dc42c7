use thiserror::Error;

use crate::capture::CaptureError;
use crate::transpile::TranspileError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Compilation failed: {0}")]
    Compilation(#[from] TranspileError),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Runtime is not ready: {0}")]
    NotReady(String),

    #[error("Interpreter error: {0}")]
    Interpreter(String),

    #[error("Output capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Python error: {0}")]
    Python(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<pyo3::PyErr> for RuntimeError {
    fn from(err: pyo3::PyErr) -> Self {
        RuntimeError::Python(err.to_string())
    }
}

pub mod adapter;
pub mod capture;
pub mod dispatcher;
pub mod error;
pub mod js_engine;
pub mod language;
pub mod preview;
pub mod python;
pub mod result;
pub mod transpile;

pub use adapter::{Interpreter, InterpreterLoader, InterpreterOutput, RunOutcome, RuntimeAdapter, RuntimeStatus};
pub use capture::{CaptureError, CaptureGuard, Captured, OutputChannel, OutputSink};
pub use dispatcher::Dispatcher;
pub use error::{Result, RuntimeError};
pub use js_engine::{ScriptEngine, ScriptOutcome};
pub use language::{ExecutionStrategy, LanguageDescriptor, LanguageRegistry};
pub use preview::PreviewDocument;
pub use python::{PythonInterpreter, PythonLoader};
pub use result::ExecutionResult;
pub use transpile::{transpile, ModuleKind, TranspileError, TranspileOptions};

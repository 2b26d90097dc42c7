use crate::adapter::{Interpreter, InterpreterLoader, InterpreterOutput};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::ffi::CStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const PACKAGE_SCAN: &CStr = c"
import pkgutil, sys
packages = sorted({m.name for m in pkgutil.iter_modules()} | set(sys.builtin_module_names))
";

// Runs `source` in a fresh `__main__` namespace with stdout and stderr
// redirected to one buffer for the duration of the call.
const RUN_HARNESS: &CStr = c"
import io, sys, traceback
_buffer = io.StringIO()
_saved = (sys.stdout, sys.stderr)
sys.stdout = sys.stderr = _buffer
error = None
try:
    exec(compile(source, '<playground>', 'exec'), {'__name__': '__main__'})
except BaseException as exc:
    error = ''.join(traceback.format_exception(type(exc), exc, exc.__traceback__.tb_next)).rstrip()
finally:
    sys.stdout, sys.stderr = _saved
stdout = _buffer.getvalue()
";

// `sys.stdout` is process-wide, so harness runs must not overlap.
static STREAMS: Mutex<()> = Mutex::new(());

/// Starts CPython through pyo3 on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonLoader;

#[async_trait]
impl InterpreterLoader for PythonLoader {
    async fn load(&self) -> Result<Arc<dyn Interpreter>> {
        let interpreter = tokio::task::spawn_blocking(|| Python::with_gil(PythonInterpreter::boot))
            .await
            .map_err(|e| RuntimeError::Interpreter(format!("Interpreter start-up task failed: {}", e)))??;

        info!(
            "Python {} loaded with {} importable modules",
            interpreter.version,
            interpreter.packages.len()
        );
        Ok(Arc::new(interpreter))
    }
}

#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    version: String,
    packages: Vec<String>,
}

impl PythonInterpreter {
    fn boot(py: Python<'_>) -> Result<Self> {
        let sys = py.import("sys")?;
        let full_version: String = sys.getattr("version")?.extract()?;
        let version = full_version
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        let scope = PyDict::new(py);
        py.run(PACKAGE_SCAN, Some(&scope), None)?;
        let packages: Vec<String> = scope
            .get_item("packages")?
            .ok_or_else(|| RuntimeError::Interpreter("Package scan produced no result".into()))?
            .extract()?;

        Ok(Self { version, packages })
    }

    fn run_sync(py: Python<'_>, code: &str) -> Result<InterpreterOutput> {
        let scope = PyDict::new(py);
        scope.set_item("source", code)?;
        py.run(RUN_HARNESS, Some(&scope), None)?;

        let stdout: String = match scope.get_item("stdout")? {
            Some(value) => value.extract()?,
            None => String::new(),
        };
        let error: Option<String> = match scope.get_item("error")? {
            Some(value) => value.extract()?,
            None => None,
        };

        Ok(InterpreterOutput { stdout, error })
    }
}

#[async_trait]
impl Interpreter for PythonInterpreter {
    fn name(&self) -> &str {
        "CPython"
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn run(&self, code: &str) -> Result<InterpreterOutput> {
        let code = code.to_string();
        debug!("Running {} bytes of Python", code.len());

        tokio::task::spawn_blocking(move || {
            let _streams = STREAMS.lock().unwrap_or_else(PoisonError::into_inner);
            Python::with_gil(|py| Self::run_sync(py, &code))
        })
            .await
            .map_err(|e| RuntimeError::Execution(format!("Task join error: {}", e)))?
    }

    fn packages(&self) -> Vec<String> {
        self.packages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs a CPython installation"]
    async fn test_python_captures_print_and_traceback() {
        let interpreter = PythonLoader.load().await.unwrap();

        let ok = interpreter.run("print('hi')\nprint(1 + 1)").await.unwrap();
        assert_eq!(ok.stdout, "hi\n2\n");
        assert!(ok.error.is_none());

        let failed = interpreter.run("raise ValueError('bad')").await.unwrap();
        assert!(failed.error.unwrap().ends_with("ValueError: bad"));
        assert!(interpreter.packages().iter().any(|p| p == "json"));
    }
}

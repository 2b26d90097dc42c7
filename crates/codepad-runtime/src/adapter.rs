//! Lazily loaded interpreter behind a single-flight state machine.
//!
//! `Uninitialized -> Loading -> Ready | Error`, with `Error -> Loading` on the
//! next `initialize()` and `Ready` absorbing further calls. Concurrent callers
//! of `initialize()` while a load is in flight await the same shared future.

use crate::error::{Result, RuntimeError};
use crate::python::PythonLoader;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum RuntimeStatus {
    Uninitialized,
    Loading,
    Ready,
    Error(String),
}

impl RuntimeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, RuntimeStatus::Ready)
    }
}

/// Raw result of one interpreter call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpreterOutput {
    pub stdout: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn run(&self, code: &str) -> Result<InterpreterOutput>;

    /// Module names importable in this interpreter, sorted.
    fn packages(&self) -> Vec<String>;
}

#[async_trait]
pub trait InterpreterLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Interpreter>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl RunOutcome {
    fn failure(message: String, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
            execution_time_ms,
        }
    }
}

type LoadFuture = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

enum Slot {
    Uninitialized,
    Loading(LoadFuture),
    Ready(Arc<dyn Interpreter>),
    Failed(String),
}

static PYTHON: OnceCell<Arc<RuntimeAdapter>> = OnceCell::new();

pub struct RuntimeAdapter {
    display_name: &'static str,
    loader: Arc<dyn InterpreterLoader>,
    slot: Arc<Mutex<Slot>>,
    loads: Arc<AtomicUsize>,
}

impl RuntimeAdapter {
    pub fn new(display_name: &'static str, loader: Arc<dyn InterpreterLoader>) -> Arc<Self> {
        Arc::new(Self {
            display_name,
            loader,
            slot: Arc::new(Mutex::new(Slot::Uninitialized)),
            loads: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The process-wide CPython adapter.
    pub fn python() -> Arc<Self> {
        Arc::clone(PYTHON.get_or_init(|| Self::new("Python", Arc::new(PythonLoader))))
    }

    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    pub fn status(&self) -> RuntimeStatus {
        match &*self.lock() {
            Slot::Uninitialized => RuntimeStatus::Uninitialized,
            Slot::Loading(_) => RuntimeStatus::Loading,
            Slot::Ready(_) => RuntimeStatus::Ready,
            Slot::Failed(message) => RuntimeStatus::Error(message.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), Slot::Ready(_))
    }

    /// Number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Brings the runtime to `Ready`, joining an in-flight load if there is one.
    pub async fn initialize(&self) -> RuntimeStatus {
        let pending = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(_) => return RuntimeStatus::Ready,
                Slot::Loading(pending) => {
                    debug!("{} runtime is already loading", self.display_name);
                    pending.clone()
                }
                Slot::Uninitialized | Slot::Failed(_) => {
                    let pending = self.start_load();
                    *slot = Slot::Loading(pending.clone());
                    pending
                }
            }
        };

        let _ = pending.await;
        self.status()
    }

    fn start_load(&self) -> LoadFuture {
        let display_name = self.display_name;
        let loader = Arc::clone(&self.loader);
        let slot = Arc::clone(&self.slot);
        self.loads.fetch_add(1, Ordering::SeqCst);

        info!("Loading {} runtime", display_name);
        let task = tokio::spawn(async move {
            let start = Instant::now();
            let loaded = loader.load().await;
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            match loaded {
                Ok(interpreter) => {
                    info!(
                        "{} runtime ready ({} {}) in {}ms",
                        display_name,
                        interpreter.name(),
                        interpreter.version(),
                        start.elapsed().as_millis()
                    );
                    *slot = Slot::Ready(interpreter);
                    Ok(())
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("{} runtime failed to load: {}", display_name, message);
                    *slot = Slot::Failed(message.clone());
                    Err(message)
                }
            }
        });

        let slot = Arc::clone(&self.slot);
        async move {
            match task.await {
                Ok(loaded) => loaded,
                Err(e) => {
                    let message = format!("Runtime loader task failed: {}", e);
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Slot::Failed(message.clone());
                    Err(message)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Runs `code` in the loaded interpreter. Never fails: a runtime that is not
    /// ready or an interpreter error yields `success: false`.
    pub async fn run(&self, code: &str) -> RunOutcome {
        let start = Instant::now();
        let Some(interpreter) = self.interpreter() else {
            return RunOutcome::failure(format!("{} runtime is not initialized", self.display_name), 0);
        };

        let output = interpreter.run(code).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        match output {
            Ok(output) => RunOutcome {
                success: output.error.is_none(),
                output: output.stdout,
                error: output.error,
                execution_time_ms,
            },
            Err(e) => RunOutcome::failure(e.to_string(), execution_time_ms),
        }
    }

    pub fn list_available_packages(&self) -> Result<Vec<String>> {
        self.interpreter()
            .map(|interpreter| interpreter.packages())
            .ok_or_else(|| RuntimeError::NotReady(format!("{} runtime is not initialized", self.display_name)))
    }

    fn interpreter(&self) -> Option<Arc<dyn Interpreter>> {
        match &*self.lock() {
            Slot::Ready(interpreter) => Some(Arc::clone(interpreter)),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

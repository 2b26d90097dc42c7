use crate::adapter::RuntimeAdapter;
use crate::capture::{CaptureError, OutputChannel, OutputSink};
use crate::js_engine::ScriptEngine;
use crate::language::{ExecutionStrategy, LanguageDescriptor, LanguageRegistry};
use crate::result::{non_empty, ExecutionResult};
use crate::transpile::{transpile, TranspileOptions};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info_span, Instrument};

pub const BUSY_MESSAGE: &str = "Another execution is already running";

/// Routes a snippet to the engine its language needs.
pub struct Dispatcher {
    registry: LanguageRegistry,
    engine: Arc<ScriptEngine>,
    channel: Arc<OutputChannel>,
    heavy: Arc<RuntimeAdapter>,
}

impl Dispatcher {
    pub fn new(heavy: Arc<RuntimeAdapter>) -> Self {
        Self {
            registry: LanguageRegistry::builtin(),
            engine: Arc::new(ScriptEngine::new()),
            channel: OutputChannel::new(),
            heavy,
        }
    }

    /// Dispatcher wired to the process-wide Python runtime.
    pub fn with_defaults() -> Self {
        Self::new(RuntimeAdapter::python())
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn heavy_runtime(&self) -> &Arc<RuntimeAdapter> {
        &self.heavy
    }

    pub fn channel(&self) -> &Arc<OutputChannel> {
        &self.channel
    }

    /// Runs `code` as `language_id`. Every failure is reported in the result.
    pub async fn execute(&self, code: &str, language_id: &str) -> ExecutionResult {
        let span = info_span!(
            "execute",
            language = %language_id,
            duration_ms = field::Empty,
            succeeded = field::Empty
        );
        let start = Instant::now();

        let result = self.dispatch(code, language_id).instrument(span.clone()).await;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        span.record("succeeded", result.succeeded);
        span.in_scope(|| debug!("Execution finished"));
        result
    }

    async fn dispatch(&self, code: &str, language_id: &str) -> ExecutionResult {
        let Some(language) = self.registry.find(language_id) else {
            return ExecutionResult::failure(format!("Unknown language: {}", language_id));
        };

        match language.strategy {
            ExecutionStrategy::Preview => ExecutionResult::failure(format!(
                "Execution is not supported for {}. Use the preview instead.",
                language.display_name
            )),
            ExecutionStrategy::Dynamic => self.run_script(code.to_string()).await,
            ExecutionStrategy::Typed => match transpile(code, &TranspileOptions::playground()) {
                Ok(javascript) => self.run_script(javascript).await,
                Err(e) => {
                    debug!("Transpile failed: {}", e);
                    ExecutionResult::failure(format!("{} compilation error: {}", language.display_name, e))
                }
            },
            ExecutionStrategy::Heavy => self.run_heavy(code, language).await,
        }
    }

    async fn run_script(&self, source: String) -> ExecutionResult {
        let engine = Arc::clone(&self.engine);
        let channel = Arc::clone(&self.channel);

        let task = tokio::task::spawn_blocking(move || {
            channel.with_capture(|sink| {
                let outcome = engine.evaluate(&source, sink);
                match &outcome {
                    Ok(outcome) => {
                        if let Some(message) = &outcome.thrown {
                            sink.write_line(&format!("ERROR: {}", message));
                        }
                        if let Some(value) = &outcome.returned {
                            sink.write_line(&format!("Return value: {}", value));
                        }
                    }
                    Err(e) => sink.write_line(&format!("ERROR: {}", e)),
                }
                outcome
            })
        });

        let captured = match task.await {
            Ok(Ok(captured)) => captured,
            Ok(Err(CaptureError::Busy)) => return ExecutionResult::failure(BUSY_MESSAGE),
            Err(e) => return ExecutionResult::failure(format!("ERROR: {}", e)),
        };

        let lines = non_empty(captured.lines);
        match captured.result {
            Ok(outcome) => ExecutionResult {
                output_lines: lines,
                return_value: outcome.returned,
                duration_ms: None,
                succeeded: outcome.thrown.is_none(),
                error_message: outcome.thrown,
            },
            Err(e) => ExecutionResult {
                output_lines: lines,
                return_value: None,
                duration_ms: None,
                succeeded: false,
                error_message: Some(e.to_string()),
            },
        }
    }

    async fn run_heavy(&self, code: &str, language: &LanguageDescriptor) -> ExecutionResult {
        if !self.heavy.is_ready() {
            return ExecutionResult::failure(format!("{} runtime is not initialized", language.display_name));
        }

        let _guard = match self.channel.acquire() {
            Ok(guard) => guard,
            Err(CaptureError::Busy) => return ExecutionResult::failure(BUSY_MESSAGE),
        };

        let outcome = self.heavy.run(code).await;
        let mut lines: Vec<String> = outcome.output.lines().map(str::to_string).collect();
        if let Some(error) = &outcome.error {
            lines.extend(error.lines().map(str::to_string));
        }

        ExecutionResult {
            output_lines: non_empty(lines),
            return_value: None,
            duration_ms: Some(outcome.execution_time_ms),
            succeeded: outcome.success,
            error_message: outcome.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::tests::FakeLoader;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RuntimeAdapter::new("Python", Arc::new(FakeLoader::default())))
    }

    #[tokio::test]
    async fn test_busy_channel_is_reported() {
        let dispatcher = dispatcher();
        let _held = dispatcher.channel().acquire().unwrap();

        let result = dispatcher.execute("console.log(1)", "javascript").await;

        assert!(!result.succeeded);
        assert_eq!(result.output_lines, vec![BUSY_MESSAGE]);
    }

    #[tokio::test]
    async fn test_heavy_requires_ready_runtime() {
        let dispatcher = dispatcher();

        let result = dispatcher.execute("print(1)", "python").await;
        assert_eq!(result.error_message.as_deref(), Some("Python runtime is not initialized"));

        dispatcher.heavy_runtime().initialize().await;
        let result = dispatcher.execute("hello\nworld", "py").await;
        assert!(result.succeeded);
        assert_eq!(result.output_lines, vec!["hello", "world"]);
        assert!(result.render().contains("Executed in"));
    }

    #[tokio::test]
    async fn test_heavy_runs_do_not_overlap() {
        let dispatcher = dispatcher();
        dispatcher.heavy_runtime().initialize().await;

        let (slow, second) = tokio::join!(
            dispatcher.execute("sleep 50", "python"),
            dispatcher.execute("hello", "python"),
        );

        assert!(slow.succeeded);
        assert_eq!(slow.output_lines, vec!["slept 50ms"]);
        assert!(!second.succeeded);
        assert_eq!(second.output_lines, vec![BUSY_MESSAGE]);
        assert!(!dispatcher.channel().is_engaged());

        let after = dispatcher.execute("hello", "python").await;
        assert_eq!(after.output_lines, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_script_waits_out_heavy_run() {
        let dispatcher = dispatcher();
        dispatcher.heavy_runtime().initialize().await;

        let (heavy, script) = tokio::join!(
            dispatcher.execute("sleep 50", "python"),
            dispatcher.execute("console.log(1)", "javascript"),
        );

        assert!(heavy.succeeded);
        assert_eq!(script.output_lines, vec![BUSY_MESSAGE]);
    }
}

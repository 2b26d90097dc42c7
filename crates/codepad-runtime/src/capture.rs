//! Scoped output capture.
//!
//! Engines never write to a process-wide stream. They receive a sink for the
//! duration of one execution. [`OutputChannel`] hands that sink out as a
//! [`CaptureGuard`], and only one guard can exist at a time. Dropping the guard
//! releases the channel, including when the execution panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("output channel is already engaged by another execution")]
    Busy,
}

/// Destination for lines produced by a running program.
pub trait OutputSink: Send {
    fn write_line(&mut self, line: &str);
}

impl OutputSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Result of a captured call together with the lines it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured<T> {
    pub result: T,
    pub lines: Vec<String>,
}

#[derive(Debug, Default)]
pub struct OutputChannel {
    engaged: AtomicBool,
}

impl OutputChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// Takes exclusive ownership of the channel until the guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> Result<CaptureGuard, CaptureError> {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::Busy)?;

        trace!("Output channel engaged");

        Ok(CaptureGuard {
            channel: Arc::clone(self),
            lines: Vec::new(),
        })
    }

    /// Runs `f` with the channel engaged and returns what it wrote.
    pub fn with_capture<T, F>(self: &Arc<Self>, f: F) -> Result<Captured<T>, CaptureError>
    where
        F: FnOnce(&mut CaptureGuard) -> T,
    {
        let mut guard = self.acquire()?;
        let result = f(&mut guard);
        Ok(Captured {
            result,
            lines: guard.finish(),
        })
    }
}

/// Exclusive handle on the output channel; buffers lines until released.
#[derive(Debug)]
pub struct CaptureGuard {
    channel: Arc<OutputChannel>,
    lines: Vec<String>,
}

impl CaptureGuard {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn finish(mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl OutputSink for CaptureGuard {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.channel.engaged.store(false, Ordering::Release);
        trace!("Output channel released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_lines_in_order() {
        let channel = OutputChannel::new();

        let captured = channel
            .with_capture(|sink| {
                sink.write_line("first");
                sink.write_line("second");
                42
            })
            .unwrap();

        assert_eq!(captured.result, 42);
        assert_eq!(captured.lines, vec!["first", "second"]);
        assert!(!channel.is_engaged());
    }

    #[test]
    fn test_nested_capture_is_rejected() {
        let channel = OutputChannel::new();

        let captured = channel
            .with_capture(|_| channel.with_capture(|_| ()).unwrap_err())
            .unwrap();

        assert_eq!(captured.result, CaptureError::Busy);
        assert!(!channel.is_engaged());
    }

    #[test]
    fn test_channel_released_after_panic() {
        let channel = OutputChannel::new();
        let inner = Arc::clone(&channel);

        let outcome = std::panic::catch_unwind(move || {
            let _ = inner.with_capture(|sink| {
                sink.write_line("before panic");
                panic!("engine exploded");
            });
        });

        assert!(outcome.is_err());
        assert!(!channel.is_engaged());
        assert!(channel.acquire().is_ok());
    }
}

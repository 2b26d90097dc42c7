use serde::{Deserialize, Serialize};

pub const NO_OUTPUT: &str = "No output";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output_lines: Vec<String>,

    pub return_value: Option<String>,

    pub duration_ms: Option<u64>,

    pub succeeded: bool,

    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn success(output_lines: Vec<String>, return_value: Option<String>) -> Self {
        Self {
            output_lines: non_empty(output_lines),
            return_value,
            duration_ms: None,
            succeeded: true,
            error_message: None,
        }
    }

    /// A failed result whose only output line is the message itself.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            output_lines: vec![message.clone()],
            return_value: None,
            duration_ms: None,
            succeeded: false,
            error_message: Some(message),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn output(&self) -> String {
        self.output_lines.join("\n")
    }

    /// Output text as shown to the user, with the timing footer when known.
    pub fn render(&self) -> String {
        let mut text = self.output();
        if let Some(ms) = self.duration_ms {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&format!("Executed in {}ms", ms));
        }
        text
    }
}

pub(crate) fn non_empty(lines: Vec<String>) -> Vec<String> {
    if lines.is_empty() {
        vec![NO_OUTPUT.to_string()]
    } else {
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_without_lines_reads_no_output() {
        let result = ExecutionResult::success(Vec::new(), None);
        assert_eq!(result.output_lines, vec![NO_OUTPUT]);
        assert!(result.succeeded);
    }

    #[test]
    fn test_render_appends_duration() {
        let result = ExecutionResult::success(vec!["a".into(), "b".into()], None).with_duration(12);
        assert_eq!(result.render(), "a\nb\n\nExecuted in 12ms");

        let failed = ExecutionResult::failure("Unknown language: cobol");
        assert_eq!(failed.render(), "Unknown language: cobol");
        assert_eq!(failed.error_message.as_deref(), Some("Unknown language: cobol"));
    }
}

//! Embedded V8 evaluation of playground JavaScript.
//!
//! Every evaluation gets a fresh isolate and context. A small harness installs
//! a `console` that records lines, a queue-backed `setTimeout`, and a `run`
//! entry point that wraps the snippet with `new Function`. After the body and
//! its microtasks settle, queued timers are drained in delay order and the
//! recorded state is read back as JSON.

use crate::capture::OutputSink;
use crate::error::{Result, RuntimeError};
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{debug, info};
use v8::{Context, ContextScope, HandleScope, Script};

static V8_PLATFORM: Lazy<()> = Lazy::new(|| {
    let platform = v8::new_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform);
    v8::V8::initialize();
    info!("V8 platform initialized");
});

/// Upper bound on timer callbacks drained after the body finishes.
const MAX_TIMER_TICKS: usize = 10_000;

const HARNESS: &str = r#"
(() => {
  const state = { lines: [], returned: null, thrown: null };
  const timers = [];

  const describeError = (e) =>
    e !== null && typeof e === "object" && "message" in e ? String(e.message) : String(e);

  const format = (value) => {
    if (typeof value === "string") return value;
    if (value === undefined) return "undefined";
    if (value instanceof Error) return `${value.name}: ${value.message}`;
    if (typeof value === "function") return `[Function: ${value.name || "anonymous"}]`;
    if (typeof value === "bigint") return `${value}n`;
    if (typeof value === "symbol") return value.toString();
    if (value !== null && typeof value === "object") {
      try {
        const json = JSON.stringify(value, null, 2);
        if (json !== undefined) return json;
      } catch (_) {}
    }
    return String(value);
  };

  const fail = (e) => {
    if (state.thrown === null) state.thrown = describeError(e);
  };

  const write = (...args) => state.lines.push(args.map(format).join(" "));
  globalThis.console = { log: write, info: write, warn: write, error: write, debug: write, trace: write };

  globalThis.setTimeout = (callback, delay = 0, ...args) => {
    timers.push({ callback, delay: Number(delay) || 0, args, seq: timers.length, cancelled: false });
    return timers.length;
  };
  globalThis.clearTimeout = (id) => {
    const timer = timers[id - 1];
    if (timer) timer.cancelled = true;
  };

  globalThis.__codepad = {
    state,
    run(source) {
      let result;
      try {
        result = new Function(source)();
      } catch (e) {
        fail(e);
        return;
      }
      if (result !== null && typeof result === "object" && typeof result.then === "function") {
        result.then(
          (value) => {
            if (value !== undefined) state.returned = format(value);
          },
          fail,
        );
      } else if (result !== undefined) {
        state.returned = format(result);
      }
    },
    tick() {
      const due = timers
        .filter((t) => !t.cancelled)
        .sort((a, b) => a.delay - b.delay || a.seq - b.seq)[0];
      if (!due) return false;
      due.cancelled = true;
      try {
        if (typeof due.callback === "function") due.callback(...due.args);
      } catch (e) {
        fail(e);
      }
      return true;
    },
  };
})();
"#;

/// What a snippet produced besides its console lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub returned: Option<String>,
    pub thrown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarnessState {
    lines: Vec<String>,
    returned: Option<String>,
    thrown: Option<String>,
}

macro_rules! run_script {
    ($scope:expr, $source:expr) => {{
        let code = v8::String::new($scope, $source)
            .ok_or_else(|| RuntimeError::Execution("Failed to create V8 string".into()))?;
        let script = Script::compile($scope, code, None)
            .ok_or_else(|| RuntimeError::Execution("Failed to compile script".into()))?;
        script
            .run($scope)
            .ok_or_else(|| RuntimeError::Execution("Script execution failed".into()))?
    }};
}

#[derive(Debug)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Lazy::force(&V8_PLATFORM);
        Self
    }

    /// Evaluates `source` as a function body, writing console lines to `sink`.
    ///
    /// Blocks the calling thread until the body, its microtasks and any queued
    /// timers have run.
    pub fn evaluate(&self, source: &str, sink: &mut dyn OutputSink) -> Result<ScriptOutcome> {
        let body = format!("globalThis.__codepad.run({});", serde_json::to_string(source)?);

        let isolate = &mut v8::Isolate::new(v8::CreateParams::default());
        let scope = std::pin::pin!(HandleScope::new(isolate));
        let scope = &mut scope.init();
        let context = Context::new(scope, Default::default());
        let scope = &mut ContextScope::new(scope, context);

        run_script!(scope, HARNESS);
        run_script!(scope, &body);
        scope.perform_microtask_checkpoint();

        let mut ticks = 0;
        while ticks < MAX_TIMER_TICKS {
            let ran = run_script!(scope, "globalThis.__codepad.tick()");
            if !ran.is_true() {
                break;
            }
            scope.perform_microtask_checkpoint();
            ticks += 1;
        }
        if ticks > 0 {
            debug!("Drained {} timer callbacks", ticks);
        }

        let json = run_script!(scope, "JSON.stringify(globalThis.__codepad.state)");
        let json = json
            .to_string(scope)
            .ok_or_else(|| RuntimeError::Execution("Failed to read harness state".into()))?
            .to_rust_string_lossy(scope);

        let state: HarnessState = serde_json::from_str(&json)?;
        for line in &state.lines {
            sink.write_line(line);
        }

        Ok(ScriptOutcome {
            returned: state.returned,
            thrown: state.thrown,
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> (Vec<String>, ScriptOutcome) {
        let mut lines = Vec::new();
        let outcome = ScriptEngine::new().evaluate(source, &mut lines).unwrap();
        (lines, outcome)
    }

    #[test]
    fn test_console_lines_and_formatting() {
        let (lines, outcome) = eval("console.log('a', 1, [1, 2]);\nconsole.error(new TypeError('bad'));");

        assert_eq!(lines, vec!["a 1 [\n  1,\n  2\n]", "TypeError: bad"]);
        assert_eq!(outcome, ScriptOutcome::default());
    }

    #[test]
    fn test_return_value_and_throw() {
        let (_, outcome) = eval("return 6 * 7;");
        assert_eq!(outcome.returned.as_deref(), Some("42"));

        let (_, outcome) = eval("throw new Error('boom');");
        assert_eq!(outcome.thrown.as_deref(), Some("boom"));
    }

    #[test]
    fn test_syntax_error_is_thrown_value() {
        let (_, outcome) = eval("let = ;");
        assert!(outcome.thrown.is_some());
    }

    #[test]
    fn test_promises_and_timers_settle() {
        let (lines, outcome) = eval(
            "setTimeout(() => console.log('late'), 10);\nsetTimeout(() => console.log('soon'), 0);\nPromise.resolve().then(() => console.log('micro'));\nreturn Promise.resolve('done');",
        );

        assert_eq!(lines, vec!["micro", "soon", "late"]);
        assert_eq!(outcome.returned.as_deref(), Some("done"));
    }
}

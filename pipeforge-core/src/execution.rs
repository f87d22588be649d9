use crate::error::PipelineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Exit code reported when no process exit status exists (launch failure or
/// timeout).
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// One external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    pub executable_path: String,
    pub argument_map: IndexMap<String, String>,
}

impl ExecutionSpec {
    pub fn new(executable_path: impl Into<String>) -> Self {
        Self {
            executable_path: executable_path.into(),
            argument_map: IndexMap::new(),
        }
    }

    /// Appends an argument. Re-inserting a key keeps its original position.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.argument_map.insert(key.into(), value.into());
        self
    }

    /// `[executable, --k1, v1, --k2, v2, ...]` in insertion order.
    ///
    /// Values are opaque tokens; nothing here goes through a shell.
    pub fn argument_vector(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + 2 * self.argument_map.len());
        argv.push(self.executable_path.clone());
        for (key, value) in &self.argument_map {
            argv.push(format!("--{key}"));
            argv.push(value.clone());
        }
        argv
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    LaunchFailed,
    TimedOut,
    NonZeroExit,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::LaunchFailed => "LaunchFailed",
            FailureKind::TimedOut => "TimedOut",
            FailureKind::NonZeroExit => "NonZeroExit",
        };
        f.write_str(name)
    }
}

/// Outcome of one process run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub stdout_text: Option<String>,
    pub stderr_text: Option<String>,
    pub exit_code: i32,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            stdout_text: Some(stdout.into()),
            stderr_text: None,
            exit_code: 0,
            failure: None,
        }
    }

    pub fn non_zero_exit(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout_text: None,
            stderr_text: Some(stderr.into()),
            exit_code,
            failure: Some(FailureKind::NonZeroExit),
        }
    }

    pub fn launch_failed(detail: impl fmt::Display) -> Self {
        Self::sentinel(FailureKind::LaunchFailed, detail)
    }

    pub fn timed_out(detail: impl fmt::Display) -> Self {
        Self::sentinel(FailureKind::TimedOut, detail)
    }

    fn sentinel(kind: FailureKind, detail: impl fmt::Display) -> Self {
        Self {
            succeeded: false,
            stdout_text: None,
            stderr_text: Some(format!("{kind}: {detail}")),
            exit_code: SENTINEL_EXIT_CODE,
            failure: Some(kind),
        }
    }

    /// Splits the result into the routable payload or the pipeline error.
    ///
    /// This is the only way to obtain a [`StageOutput`], so a failed result
    /// can never reach the result router.
    pub fn into_output(self, executable: &str) -> Result<StageOutput, PipelineError> {
        if self.succeeded {
            return Ok(StageOutput::from_stdout(
                self.stdout_text.unwrap_or_default(),
            ));
        }

        let stderr = self.stderr_text.unwrap_or_default();
        let executable = executable.to_string();
        Err(match self.failure {
            Some(FailureKind::LaunchFailed) => PipelineError::LaunchFailed {
                executable,
                detail: stderr,
            },
            Some(FailureKind::TimedOut) => PipelineError::TimedOut {
                executable,
                detail: stderr,
            },
            Some(FailureKind::NonZeroExit) | None => PipelineError::NonZeroExit {
                executable,
                code: self.exit_code,
                stderr,
            },
        })
    }
}

/// Payload of a successful execution, ready for routing.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    payload: serde_json::Value,
}

impl StageOutput {
    fn from_stdout(raw: String) -> Self {
        let payload = serde_json::from_str(raw.trim())
            .unwrap_or(serde_json::Value::String(raw));
        Self { payload }
    }

    /// Stdout decoded as JSON, or the raw text as a JSON string.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Numeric fields of the payload object, or of its `metrics` object
    /// when one is present.
    pub fn numeric_metrics(&self) -> BTreeMap<String, f64> {
        let source = match self.payload.get("metrics") {
            Some(serde_json::Value::Object(metrics)) => metrics,
            _ => match &self.payload {
                serde_json::Value::Object(object) => object,
                _ => return BTreeMap::new(),
            },
        };

        source
            .iter()
            .filter_map(|(key, value)| value.as_f64().map(|n| (key.clone(), n)))
            .collect()
    }
}

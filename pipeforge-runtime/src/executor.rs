//! # Process executor
//!
//! Runs external interpreter processes on a bounded worker pool.

use async_trait::async_trait;
use pipeforge_config::ExecutorSettings;
use pipeforge_core::{
    ExecutionResult, ExecutionSpec, ProcessRunner, SENTINEL_EXIT_CODE,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interpreter placed before the script path
    pub interpreter: Option<String>,
    /// Root relative script paths resolve against
    pub applications_root: PathBuf,
    /// Worker pool size: processes allowed to run at once
    pub max_concurrent_processes: usize,
    /// Timeout used when callers have none of their own
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&ExecutorSettings::default())
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            interpreter: settings.interpreter.clone(),
            applications_root: settings.applications_root.clone(),
            max_concurrent_processes: settings.max_concurrent_processes.max(1),
            default_timeout: settings.timeout(),
        }
    }
}

/// Spawns one OS process per call, never more than the pool allows.
pub struct ProcessExecutor {
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::with_config(ExecutorConfig::default())
    }
}

impl ProcessExecutor {
    pub fn with_config(config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_processes));
        Self { config, semaphore }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Free worker-pool slots.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs `spec` with the configured default timeout.
    pub async fn execute_default(&self, spec: &ExecutionSpec) -> ExecutionResult {
        self.execute(spec, self.config.default_timeout).await
    }

    fn command_for(&self, spec: &ExecutionSpec) -> Command {
        let argv = spec.argument_vector();
        let script = self.config.applications_root.join(&argv[0]);

        let mut command = match &self.config.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(script);
                command
            }
            None => Command::new(script),
        };
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

fn join_lines(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ProcessRunner for ProcessExecutor {
    /// Waits for a pool slot, spawns the process and waits for it or the
    /// timeout. On timeout the child is killed (the wait future owns it and
    /// `kill_on_drop` is set) and the slot is released.
    #[tracing::instrument(level = "info", skip(self, spec), fields(executable = %spec.executable_path, args = spec.argument_map.len()))]
    async fn execute(&self, spec: &ExecutionSpec, timeout: Duration) -> ExecutionResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ExecutionResult::launch_failed(format!("worker pool closed: {e}"));
            }
        };

        let start = Instant::now();
        let child = match self.command_for(spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(executable = %spec.executable_path, error = %e, "process launch failed");
                return ExecutionResult::launch_failed(e);
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                tracing::error!(executable = %spec.executable_path, timeout_ms = timeout.as_millis() as u64, "process timed out, killed");
                ExecutionResult::timed_out(format!("no exit within {timeout:?}"))
            }
            Ok(Err(e)) => ExecutionResult::launch_failed(format!("failed collecting output: {e}")),
            Ok(Ok(output)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                if output.status.success() {
                    tracing::debug!(executable = %spec.executable_path, duration_ms, "process succeeded");
                    ExecutionResult::success(join_lines(&output.stdout))
                } else {
                    let code = output.status.code().unwrap_or(SENTINEL_EXIT_CODE);
                    tracing::warn!(executable = %spec.executable_path, code, duration_ms, "process exited with failure");
                    ExecutionResult::non_zero_exit(code, join_lines(&output.stderr))
                }
            }
        }
    }
}

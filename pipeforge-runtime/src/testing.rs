//! Scripted [`ProcessRunner`] for exercising orchestration without spawning
//! processes.

use async_trait::async_trait;
use pipeforge_core::{ExecutionResult, ExecutionSpec, ProcessRunner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct Response {
    suffix: String,
    result: ExecutionResult,
    delay: Duration,
}

/// Answers each call with the response registered for the longest matching
/// script-path suffix, or a `{}` success when none matches.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<Response>>,
    calls: Mutex<Vec<ExecutionSpec>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, suffix: &str, result: ExecutionResult) {
        self.respond_after(suffix, result, Duration::ZERO);
    }

    /// Like [`respond`](Self::respond) but the call takes `delay` to finish.
    pub fn respond_after(&self, suffix: &str, result: ExecutionResult, delay: Duration) {
        let mut responses = self.lock_responses();
        responses.retain(|response| response.suffix != suffix);
        responses.push(Response {
            suffix: suffix.to_string(),
            result,
            delay,
        });
    }

    /// Every call so far, in start order.
    pub fn calls(&self) -> Vec<ExecutionSpec> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls_for(&self, suffix: &str) -> Vec<ExecutionSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.executable_path.ends_with(suffix))
            .collect()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, Vec<Response>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn response_for(&self, path: &str) -> Response {
        self.lock_responses()
            .iter()
            .filter(|response| path.ends_with(&response.suffix))
            .max_by_key(|response| response.suffix.len())
            .cloned()
            .unwrap_or_else(|| Response {
                suffix: String::new(),
                result: ExecutionResult::success("{}"),
                delay: Duration::ZERO,
            })
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn execute(&self, spec: &ExecutionSpec, timeout: Duration) -> ExecutionResult {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(spec.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);

        let response = self.response_for(&spec.executable_path);
        if response.delay > timeout {
            tokio::time::sleep(timeout).await;
            return ExecutionResult::timed_out(format!(
                "{} exceeded {:?}",
                spec.executable_path, timeout
            ));
        }
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        response.result
    }
}

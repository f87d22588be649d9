//! Shared mechanics of one process-backed stage: metrics around the call,
//! the call itself, and routing of its output.

use crate::metrics::MetricsRecorder;
use crate::router::ResultRouter;
use indexmap::IndexMap;
use pipeforge_core::{
    ConfigMap, DestinationTag, ExecutionSpec, PipelineError, ProcessRunner,
    StageOutput, StoreKind,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One external script call plus the identifying tags its metrics carry.
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    pub component: String,
    pub spec: ExecutionSpec,
    pub tags: IndexMap<String, Value>,
}

impl ScriptInvocation {
    pub fn new(component: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            spec: ExecutionSpec::new(script),
            tags: IndexMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec = self.spec.arg(key, value);
        self
    }

    /// Appends every config entry as `--key value`, in config order.
    pub fn config_args(self, config: &ConfigMap) -> Self {
        config
            .iter()
            .fold(self, |call, (key, value)| call.arg(key.clone(), arg_text(value)))
    }

    fn attributes(&self, extra: impl IntoIterator<Item = (&'static str, Value)>) -> IndexMap<String, Value> {
        let mut attributes = self.tags.clone();
        attributes.insert("script".to_string(), json!(self.spec.executable_path));
        for (key, value) in extra {
            attributes.insert(key.to_string(), value);
        }
        attributes
    }
}

/// Strings pass through verbatim; everything else as compact JSON.
pub(crate) fn arg_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Services every stage uses; cheap to clone into stage closures.
#[derive(Clone)]
pub struct StageRuntime {
    runner: Arc<dyn ProcessRunner>,
    metrics: MetricsRecorder,
    router: Arc<ResultRouter>,
    timeout: Duration,
}

impl StageRuntime {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        metrics: MetricsRecorder,
        router: Arc<ResultRouter>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            metrics,
            router,
            timeout,
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn router(&self) -> &Arc<ResultRouter> {
        &self.router
    }

    /// Runs the script, recording a metric before and after.
    ///
    /// Execution failures are recorded tagged with their kind and returned;
    /// nothing is retried.
    pub async fn execute(&self, call: &ScriptInvocation) -> Result<StageOutput, PipelineError> {
        self.metrics
            .record(call.component.clone(), call.attributes([("phase", json!("start"))]));

        let started = Instant::now();
        let result = self.runner.execute(&call.spec, self.timeout).await;
        let exit_code = result.exit_code;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result.into_output(&call.spec.executable_path) {
            Ok(output) => {
                self.metrics.record(
                    call.component.clone(),
                    call.attributes([
                        ("phase", json!("complete")),
                        ("exit_code", json!(exit_code)),
                        ("duration_ms", json!(duration_ms)),
                    ]),
                );
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(component = %call.component, error = %e, "stage execution failed");
                self.metrics.record(
                    call.component.clone(),
                    call.attributes([
                        ("phase", json!("failed")),
                        ("error", json!(e.kind())),
                        ("exit_code", json!(exit_code)),
                        ("duration_ms", json!(duration_ms)),
                    ]),
                );
                Err(e)
            }
        }
    }

    /// Routes a successful output. A routing failure is logged and recorded
    /// but the process that produced the output has already run.
    pub async fn route(
        &self,
        call: &ScriptInvocation,
        output: &StageOutput,
        destination: DestinationTag,
        key: &str,
    ) -> Result<StoreKind, PipelineError> {
        match self.router.route(output, destination, key).await {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::error!(component = %call.component, destination = %destination, key = %key, error = %e, "result not persisted");
                self.metrics.record(
                    call.component.clone(),
                    call.attributes([
                        ("phase", json!("routing")),
                        ("error", json!(e.kind())),
                        ("key", json!(key)),
                    ]),
                );
                Err(e)
            }
        }
    }

    pub async fn execute_and_route(
        &self,
        call: &ScriptInvocation,
        destination: DestinationTag,
        key: &str,
    ) -> Result<StageOutput, PipelineError> {
        let output = self.execute(call).await?;
        self.route(call, &output, destination, key).await?;
        Ok(output)
    }
}

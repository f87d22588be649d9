//! # Pipeline orchestrator
//!
//! One orchestrator for every domain. A request is validated, its config
//! merged with the domain defaults, turned into a [`PipelinePlan`] and run:
//! stages of a branch strictly in order, branches concurrently.

use crate::metrics::{attributes, DocumentMetricsSink, MetricsRecorder};
use crate::plans::{PipelinePlan, StageTemplate};
use crate::registry::ModelRegistry;
use crate::router::ResultRouter;
use crate::stage::StageRuntime;
use crate::task_config::TaskConfigRegistry;
use futures::future::join_all;
use pipeforge_config::{EngineConfig, MlSettings};
use pipeforge_context::{PipelineContext, PipelineState};
use pipeforge_core::{
    ConfigMap, DocumentStore, Domain, ModelRecord, PipelineError, ProcessRunner,
    RelationalStore, TaskRequest,
};
use pipeforge_logger::Logger;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Deployment decision for the ML chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MlPolicy {
    /// Accuracy must be strictly greater than this.
    pub deploy_threshold: f64,
    pub accuracy_metric: String,
    pub environment: String,
}

impl MlPolicy {
    pub fn from_settings(settings: &MlSettings) -> Self {
        Self {
            deploy_threshold: settings.deploy_threshold,
            accuracy_metric: settings.accuracy_metric.clone(),
            environment: settings.deploy_environment.clone(),
        }
    }

    /// A missing or non-numeric accuracy never deploys.
    pub fn should_deploy(&self, accuracy: Option<&Value>) -> bool {
        accuracy
            .and_then(Value::as_f64)
            .is_some_and(|accuracy| accuracy > self.deploy_threshold)
    }
}

impl Default for MlPolicy {
    fn default() -> Self {
        Self::from_settings(&MlSettings::default())
    }
}

/// Outcome of one branch of a request.
#[derive(Debug, Clone)]
pub struct BranchReport {
    pub name: String,
    pub context: PipelineContext,
    pub error: Option<PipelineError>,
}

impl BranchReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.context.state == PipelineState::Complete
    }
}

/// Outcome of one request, for callers that await the run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub request_id: String,
    pub domain: Domain,
    pub identifier: String,
    /// Set when the request never became a plan.
    pub rejection: Option<PipelineError>,
    pub branches: Vec<BranchReport>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.rejection.is_none() && self.branches.iter().all(BranchReport::succeeded)
    }

    pub fn branch(&self, name: &str) -> Option<&BranchReport> {
        self.branches.iter().find(|branch| branch.name == name)
    }

    /// Every failure, rejection first.
    pub fn errors(&self) -> Vec<&PipelineError> {
        self.rejection
            .iter()
            .chain(self.branches.iter().filter_map(|branch| branch.error.as_ref()))
            .collect()
    }
}

/// Cheap to clone; clones share the executor, stores and registries.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: Arc<EngineConfig>,
    runtime: StageRuntime,
    registry: Arc<ModelRegistry>,
    task_config: Arc<TaskConfigRegistry>,
    policy: MlPolicy,
}

impl PipelineOrchestrator {
    /// Wires the default collaborators: metrics persisted to the document
    /// store through the router. Must be called inside a tokio runtime.
    pub fn from_config(
        config: EngineConfig,
        runner: Arc<dyn ProcessRunner>,
        documents: Arc<dyn DocumentStore>,
        relational: Arc<dyn RelationalStore>,
    ) -> Self {
        let router = Arc::new(ResultRouter::new(documents, relational));
        let metrics = MetricsRecorder::spawn(Arc::new(DocumentMetricsSink::new(
            router.clone(),
            config.storage.metrics_collection.clone(),
            config.storage.events_collection.clone(),
        )));
        Self::new(config, runner, router, metrics)
    }

    pub fn new(
        config: EngineConfig,
        runner: Arc<dyn ProcessRunner>,
        router: Arc<ResultRouter>,
        metrics: MetricsRecorder,
    ) -> Self {
        let runtime = StageRuntime::new(runner, metrics, router, config.executor.timeout());
        Self {
            task_config: Arc::new(TaskConfigRegistry::from_config(&config)),
            registry: Arc::new(ModelRegistry::new()),
            policy: MlPolicy::from_settings(&config.ml),
            config: Arc::new(config),
            runtime,
        }
    }

    pub fn with_policy(mut self, policy: MlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &MlPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        self.runtime.metrics()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn task_config(&self) -> &Arc<TaskConfigRegistry> {
        &self.task_config
    }

    pub async fn run(&self, request: TaskRequest) -> PipelineReport {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Runs a request to a terminal state. Failures are reported, logged and
    /// recorded; they never escape as a panic or abort other requests.
    ///
    /// An ML request waits here until no other chain holds its model id.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(request_id = %request.request_id, domain = %request.domain, identifier = %request.identifier)
    )]
    pub async fn run_with_cancel(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> PipelineReport {
        let logger = Logger::with_trace_id(request.request_id.clone());
        let metrics = self.runtime.metrics();
        metrics.record(
            "pipeline",
            attributes([
                ("phase", json!("entry")),
                ("domain", json!(request.domain)),
                ("identifier", json!(request.identifier)),
                ("request_id", json!(request.request_id)),
            ]),
        );

        let mut report = PipelineReport {
            request_id: request.request_id.clone(),
            domain: request.domain,
            identifier: request.identifier.clone(),
            rejection: None,
            branches: Vec::new(),
        };

        if let Err(e) = request.validate() {
            logger.warn(&format!("request rejected: {e}"));
            self.record_exit(&report, Some(e.kind()));
            report.rejection = Some(e);
            return report;
        }

        let config = self
            .task_config
            .merged(request.domain, &request.config)
            .await;

        let mut lease = None;
        let plan = match request.domain {
            Domain::Analytics => self.single(
                request.domain,
                &StageTemplate::analytics(&self.config),
                &request.identifier,
                &config,
            ),
            Domain::DataCollection => self.single(
                request.domain,
                &StageTemplate::data_collection(&self.config),
                &request.identifier,
                &config,
            ),
            Domain::Automated => self.single(
                request.domain,
                &StageTemplate::automated(&self.config, &request.identifier),
                &request.identifier,
                &config,
            ),
            Domain::Workflow => {
                PipelinePlan::workflow(&self.config, &self.runtime, &request.identifier, &config)
            }
            Domain::MlTraining => {
                let acquired = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    lease = self.registry.acquire(&request.identifier) => Some(lease),
                };
                let Some(acquired) = acquired else {
                    let e = PipelineError::Cancelled {
                        stage: "register".to_string(),
                    };
                    logger.warn(&format!("cancelled while waiting for model lease: {e}"));
                    self.record_exit(&report, Some(e.kind()));
                    report.rejection = Some(e);
                    return report;
                };
                let held = Arc::new(acquired);
                let plan = PipelinePlan::ml_training(
                    &self.runtime,
                    self.registry.clone(),
                    held.clone(),
                    &self.policy,
                    &self.config.scripts,
                    &self.config.storage.evaluation_table,
                    &config,
                );
                lease = Some(held);
                plan
            }
        };

        let trace_id = request.request_id.clone();
        report.branches = join_all(plan.branches.into_iter().map(|(name, chain)| {
            let cancel = cancel.clone();
            let trace_id = trace_id.clone();
            async move {
                let context = Arc::new(Mutex::new(PipelineContext::new_with_trace_id(trace_id)));
                let result = chain.build().run(context.clone(), cancel).await;
                let context = context.lock().await.clone();
                BranchReport {
                    name,
                    context,
                    error: result.err(),
                }
            }
        }))
        .await;
        drop(lease);

        for branch in &report.branches {
            logger.log_pipeline_summary(&branch.context);
            logger.log_stage_details(&branch.context);
            if let Some(e) = &branch.error {
                logger.error(&format!("branch {} failed: {e}", branch.name));
            }
        }

        let failure = report
            .branches
            .iter()
            .find_map(|branch| branch.error.as_ref())
            .map(PipelineError::kind);
        self.record_exit(&report, failure);
        logger.info(&format!(
            "{} {} finished, succeeded={}",
            report.domain,
            report.identifier,
            report.succeeded()
        ));
        report
    }

    fn single(
        &self,
        domain: Domain,
        template: &StageTemplate,
        identifier: &str,
        config: &ConfigMap,
    ) -> PipelinePlan {
        PipelinePlan::single(domain, template, &self.runtime, identifier, config)
    }

    fn record_exit(&self, report: &PipelineReport, error: Option<&'static str>) {
        let status = if error.is_none() { "COMPLETE" } else { "FAILED" };
        let mut attrs = attributes([
            ("phase", json!("exit")),
            ("domain", json!(report.domain)),
            ("identifier", json!(report.identifier)),
            ("request_id", json!(report.request_id)),
            ("status", json!(status)),
        ]);
        if let Some(kind) = error {
            attrs.insert("error".to_string(), json!(kind));
        }
        self.runtime.metrics().record("pipeline", attrs);
    }

    /// Runs the ML chain again for an existing model with `{retrain: true}`.
    pub async fn retrain(&self, model_id: &str) -> PipelineReport {
        let mut config = ConfigMap::new();
        config.insert("retrain".to_string(), json!(true));
        self.run(TaskRequest::new(Domain::MlTraining, model_id, config))
            .await
    }

    pub async fn model_status(&self, model_id: &str) -> Option<ModelRecord> {
        self.registry.get(model_id).await
    }

    pub fn log_event(&self, event_type: &str, data: ConfigMap) {
        self.runtime.metrics().log_event(event_type, data);
    }
}

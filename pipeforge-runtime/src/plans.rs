//! # Per-domain stage plans
//!
//! Every domain is the same orchestrator driven by a different plan: the
//! one-stage domains share [`StageTemplate`], the generic workflow fans out
//! into two independent branches and the ML domain is a conditional chain.

use crate::orchestrator::MlPolicy;
use crate::registry::{ModelLease, ModelRegistry};
use crate::stage::{ScriptInvocation, StageRuntime};
use pipeforge_config::{EngineConfig, ScriptSettings};
use pipeforge_core::{ChainBuilder, ConfigMap, DestinationTag, Domain};
use serde_json::{json, Value};
use std::sync::Arc;

/// One process-backed stage: script, argument shape and destination.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTemplate {
    /// Stage name in the pipeline context.
    pub stage: &'static str,
    /// Component name on metric events.
    pub component: &'static str,
    /// Flag the request identifier is passed under, if any.
    pub identifier_flag: Option<&'static str>,
    /// Metric tag carrying the request identifier.
    pub identifier_tag: &'static str,
    pub script: String,
    pub destination: DestinationTag,
    /// Collection or table the output lands in.
    pub key: String,
}

impl StageTemplate {
    pub fn analytics(config: &EngineConfig) -> Self {
        Self {
            stage: "analyze",
            component: "analytics_execution",
            identifier_flag: Some("pipeline"),
            identifier_tag: "pipeline",
            script: config.scripts.analytics.clone(),
            destination: DestinationTag::Processed,
            key: config.storage.analytics_table.clone(),
        }
    }

    pub fn data_collection(config: &EngineConfig) -> Self {
        Self {
            stage: "scrape",
            component: "scraping_execution",
            identifier_flag: Some("source"),
            identifier_tag: "source",
            script: config.scripts.scraping.clone(),
            destination: DestinationTag::Raw,
            key: config.storage.raw_collection.clone(),
        }
    }

    /// The task type selects the script; it is not passed as an argument.
    pub fn automated(config: &EngineConfig, task_type: &str) -> Self {
        Self {
            stage: "execute",
            component: "automated_task",
            identifier_flag: None,
            identifier_tag: "type",
            script: config.scripts.automated_for(task_type),
            destination: DestinationTag::TaskResult,
            key: config.storage.automated_table.clone(),
        }
    }

    pub fn workflow_scrape(config: &EngineConfig) -> Self {
        Self {
            stage: "scrape",
            component: "workflow_scraping",
            identifier_flag: None,
            identifier_tag: "workflow",
            script: config.scripts.workflow_scrape.clone(),
            destination: DestinationTag::Raw,
            key: config.storage.workflow_collection.clone(),
        }
    }

    pub fn workflow_train(config: &EngineConfig) -> Self {
        Self {
            stage: "train",
            component: "workflow_training",
            identifier_flag: None,
            identifier_tag: "workflow",
            script: config.scripts.workflow_train.clone(),
            destination: DestinationTag::Processed,
            key: config.storage.workflow_table.clone(),
        }
    }

    /// Identifier flag first, then the config entries in order.
    pub fn invocation(&self, identifier: &str, config: &ConfigMap) -> ScriptInvocation {
        let mut call = ScriptInvocation::new(self.component, self.script.clone())
            .tag(self.identifier_tag, identifier);
        if let Some(flag) = self.identifier_flag {
            call = call.arg(flag, identifier);
        }
        call.config_args(config)
    }

    /// Appends this template as an execute-then-route stage.
    pub fn append_to(
        &self,
        chain: ChainBuilder,
        runtime: &StageRuntime,
        identifier: &str,
        config: &ConfigMap,
    ) -> ChainBuilder {
        let call = self.invocation(identifier, config);
        let runtime = runtime.clone();
        let destination = self.destination;
        let key = self.key.clone();

        chain.stage(self.stage, move |_ctx| async move {
            runtime
                .execute_and_route(&call, destination, &key)
                .await
                .map(|_| ())
        })
    }
}

/// Independent branches of one request; each branch is a sequential chain
/// with its own context.
pub struct PipelinePlan {
    pub domain: Domain,
    pub branches: Vec<(String, ChainBuilder)>,
}

impl PipelinePlan {
    pub fn single(
        domain: Domain,
        template: &StageTemplate,
        runtime: &StageRuntime,
        identifier: &str,
        config: &ConfigMap,
    ) -> Self {
        let chain = template.append_to(ChainBuilder::new(), runtime, identifier, config);
        Self {
            domain,
            branches: vec![(domain.to_string(), chain)],
        }
    }

    /// Scraping and training fired together from the same config; neither
    /// waits for or depends on the other.
    pub fn workflow(
        config: &EngineConfig,
        runtime: &StageRuntime,
        identifier: &str,
        request_config: &ConfigMap,
    ) -> Self {
        let branches = [
            StageTemplate::workflow_scrape(config),
            StageTemplate::workflow_train(config),
        ]
        .iter()
        .map(|template| {
            let chain =
                template.append_to(ChainBuilder::new(), runtime, identifier, request_config);
            (template.component.to_string(), chain)
        })
        .collect();

        Self {
            domain: Domain::Workflow,
            branches,
        }
    }

    /// register, train, evaluate, then deploy only when the evaluated
    /// accuracy is strictly above the policy threshold.
    ///
    /// Every stage closure holds the lease, so the model stays locked until
    /// the chain reaches a terminal state.
    pub fn ml_training(
        runtime: &StageRuntime,
        registry: Arc<ModelRegistry>,
        lease: Arc<ModelLease>,
        policy: &MlPolicy,
        scripts: &ScriptSettings,
        evaluation_table: &str,
        config: &ConfigMap,
    ) -> Self {
        let model_id = lease.model_id().to_string();
        let metadata = Value::Object(config.clone().into_iter().collect());

        let train_call = ScriptInvocation::new("model_training", scripts.training.clone())
            .tag("model_id", model_id.as_str())
            .arg("model_id", model_id.as_str())
            .config_args(config);
        let evaluate_call =
            ScriptInvocation::new("model_evaluation", scripts.evaluation.clone())
                .tag("model_id", model_id.as_str())
                .arg("model_id", model_id.as_str());
        let deploy_call = scripts.deployment.as_ref().map(|script| {
            ScriptInvocation::new("model_deployment", script.clone())
                .tag("model_id", model_id.as_str())
                .arg("model_id", model_id.as_str())
                .arg("environment", policy.environment.as_str())
        });

        let chain = ChainBuilder::new()
            .stage("register", {
                let registry = registry.clone();
                let lease = lease.clone();
                let runtime = runtime.clone();
                move |_ctx| async move {
                    let record = registry.register(&lease, metadata).await;
                    runtime.metrics().log_event(
                        "model_registered",
                        crate::metrics::attributes([
                            ("model_id", json!(record.model_id)),
                            ("version", json!(record.version)),
                        ]),
                    );
                    Ok(())
                }
            })
            .stage("train", {
                let registry = registry.clone();
                let lease = lease.clone();
                let runtime = runtime.clone();
                move |_ctx| async move {
                    let output = runtime.execute(&train_call).await?;
                    registry
                        .mark_trained(&lease, output.numeric_metrics())
                        .await?;
                    Ok(())
                }
            })
            .stage("evaluate", {
                let registry = registry.clone();
                let lease = lease.clone();
                let runtime = runtime.clone();
                let accuracy_metric = policy.accuracy_metric.clone();
                let evaluation_table = evaluation_table.to_string();
                move |ctx| async move {
                    let output = runtime.execute(&evaluate_call).await?;
                    let metrics = output.numeric_metrics();
                    if let Some(accuracy) = metrics.get(&accuracy_metric) {
                        ctx.lock().await.set_variable(accuracy_metric.clone(), json!(accuracy));
                    }
                    // The record follows the finished process even if the row is lost.
                    registry.mark_evaluated(&lease, metrics).await?;
                    runtime
                        .route(&evaluate_call, &output, DestinationTag::Processed, &evaluation_table)
                        .await?;
                    Ok(())
                }
            })
            .stage_if(
                "deploy",
                {
                    let policy = policy.clone();
                    move |ctx| policy.should_deploy(ctx.get_variable(&policy.accuracy_metric))
                },
                {
                    let runtime = runtime.clone();
                    let environment = policy.environment.clone();
                    move |_ctx| async move {
                        if let Some(call) = &deploy_call {
                            runtime.execute(call).await?;
                        }
                        let record = registry.mark_deployed(&lease, &environment).await?;
                        runtime.metrics().log_event(
                            "model_deployed",
                            crate::metrics::attributes([
                                ("model_id", json!(record.model_id)),
                                ("environment", json!(environment)),
                                ("version", json!(record.version)),
                            ]),
                        );
                        Ok(())
                    }
                },
            );

        Self {
            domain: Domain::MlTraining,
            branches: vec![(Domain::MlTraining.to_string(), chain)],
        }
    }
}

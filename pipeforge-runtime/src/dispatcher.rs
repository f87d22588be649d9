//! # Task dispatcher
//!
//! The submission boundary: `submit` acknowledges at once and the pipeline
//! runs on a tracked background task. Completion is observable only through
//! metrics and store side effects.

use crate::orchestrator::PipelineOrchestrator;
use chrono::{DateTime, Utc};
use pipeforge_core::{ConfigMap, Domain, TaskRequest};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Returned to the submitter before any stage runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub request_id: String,
    pub domain: Domain,
    pub identifier: String,
    pub accepted_at: DateTime<Utc>,
}

pub struct TaskDispatcher {
    orchestrator: PipelineOrchestrator,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TaskDispatcher {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn submit(
        &self,
        domain: Domain,
        identifier: impl Into<String>,
        config: ConfigMap,
    ) -> Acknowledgement {
        self.submit_request(TaskRequest::new(domain, identifier, config))
    }

    /// Never waits for the pipeline and never reports its failure; an
    /// invalid request is acknowledged too and rejected in the background.
    pub fn submit_request(&self, request: TaskRequest) -> Acknowledgement {
        let ack = Acknowledgement {
            request_id: request.request_id.clone(),
            domain: request.domain,
            identifier: request.identifier.clone(),
            accepted_at: Utc::now(),
        };

        let orchestrator = self.orchestrator.clone();
        let cancel = self.cancel.child_token();
        self.tracker.spawn(async move {
            let report = orchestrator.run_with_cancel(request, cancel).await;
            tracing::debug!(
                request_id = %report.request_id,
                succeeded = report.succeeded(),
                "submitted pipeline finished"
            );
        });

        tracing::info!(request_id = %ack.request_id, domain = %ack.domain, identifier = %ack.identifier, "task accepted");
        ack
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every pipeline submitted so far. New submissions are still
    /// accepted afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancels every in-flight pipeline and waits for them to stop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.drain().await;
    }
}

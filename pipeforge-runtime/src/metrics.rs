//! # Metrics recorder
//!
//! Fire-and-forget recording of metric events. Callers hand events to a
//! channel; a background worker writes them to the sink and logs (never
//! propagates) sink failures.

use crate::router::ResultRouter;
use async_trait::async_trait;
use indexmap::IndexMap;
use pipeforge_core::{DestinationTag, MetricEvent, MetricKind, MetricsSink, StoreError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Builds an attribute map from literal pairs.
pub fn attributes<const N: usize>(
    pairs: [(&str, serde_json::Value); N],
) -> IndexMap<String, serde_json::Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

enum RecorderCommand {
    Record(MetricEvent),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle onto the recorder worker.
#[derive(Clone)]
pub struct MetricsRecorder {
    tx: mpsc::UnboundedSender<RecorderCommand>,
}

impl MetricsRecorder {
    /// Starts the writer task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn MetricsSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    RecorderCommand::Record(event) => {
                        if let Err(e) = sink.write(&event).await {
                            tracing::warn!(component = %event.component, error = %e, "metric write dropped");
                        }
                    }
                    RecorderCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("metrics recorder stopped");
        });

        Self { tx }
    }

    /// Records a metric event. Never blocks and never fails the caller.
    pub fn record(
        &self,
        component: impl Into<String>,
        attributes: IndexMap<String, serde_json::Value>,
    ) {
        self.send(MetricEvent::metric(component, attributes));
    }

    /// Records a discrete event (as opposed to a measurement).
    pub fn log_event(
        &self,
        event_type: impl Into<String>,
        data: IndexMap<String, serde_json::Value>,
    ) {
        self.send(MetricEvent::event(event_type, data));
    }

    fn send(&self, event: MetricEvent) {
        if let Err(e) = self.tx.send(RecorderCommand::Record(event)) {
            if let RecorderCommand::Record(event) = e.0 {
                tracing::warn!(component = %event.component, "metrics recorder closed, event dropped");
            }
        }
    }

    /// Waits until every event recorded before this call reached the sink.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(RecorderCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Persists metric events into the document store through the router:
/// measurements to the metrics collection, events to the events collection.
pub struct DocumentMetricsSink {
    router: Arc<ResultRouter>,
    metrics_collection: String,
    events_collection: String,
}

impl DocumentMetricsSink {
    pub fn new(
        router: Arc<ResultRouter>,
        metrics_collection: impl Into<String>,
        events_collection: impl Into<String>,
    ) -> Self {
        Self {
            router,
            metrics_collection: metrics_collection.into(),
            events_collection: events_collection.into(),
        }
    }
}

#[async_trait]
impl MetricsSink for DocumentMetricsSink {
    async fn write(&self, event: &MetricEvent) -> Result<(), StoreError> {
        let (destination, collection) = match event.kind {
            MetricKind::Metric => (DestinationTag::Metric, &self.metrics_collection),
            MetricKind::Event => (DestinationTag::Event, &self.events_collection),
        };
        self.router
            .persist(destination, collection, event.to_document())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocumentStore, MemoryMetricsSink, MemoryRelationalStore};
    use serde_json::json;

    #[tokio::test]
    async fn records_reach_sink_after_flush() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let recorder = MetricsRecorder::spawn(sink.clone());

        recorder.record("scraping_execution", attributes([("source", json!("news_site"))]));
        recorder.log_event("deploy", attributes([("model_id", json!("m1"))]));
        recorder.flush().await;

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].attribute("source"), Some(&json!("news_site")));
        assert_eq!(events[1].kind, MetricKind::Event);
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let sink = Arc::new(MemoryMetricsSink::new());
        sink.set_unavailable(true);
        let recorder = MetricsRecorder::spawn(sink.clone());

        recorder.record("analytics_execution", attributes([]));
        recorder.flush().await;
        assert!(sink.events().await.is_empty());

        sink.set_unavailable(false);
        recorder.record("analytics_execution", attributes([]));
        recorder.flush().await;
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn document_sink_splits_metrics_and_events() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let router = Arc::new(ResultRouter::new(
            documents.clone(),
            Arc::new(MemoryRelationalStore::new()),
        ));
        let recorder = MetricsRecorder::spawn(Arc::new(DocumentMetricsSink::new(
            router,
            "system_metrics",
            "events",
        )));

        recorder.record("pipeline", attributes([("phase", json!("entry"))]));
        recorder.log_event("model_deployed", attributes([]));
        recorder.flush().await;

        assert_eq!(documents.documents("system_metrics").await.len(), 1);
        let events = documents.documents("events").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["component"], json!("model_deployed"));
    }
}

//! # Result router
//!
//! Pure dispatch of successful stage output to the document or relational
//! store, chosen by destination tag.

use pipeforge_core::{
    DestinationTag, DocumentStore, PipelineError, RelationalStore, StageOutput,
    StoreKind,
};
use std::sync::Arc;

/// Holds the process-wide store handles.
pub struct ResultRouter {
    documents: Arc<dyn DocumentStore>,
    relational: Arc<dyn RelationalStore>,
}

impl ResultRouter {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        relational: Arc<dyn RelationalStore>,
    ) -> Self {
        Self {
            documents,
            relational,
        }
    }

    /// Persists a successful stage output under `key` (collection or table
    /// name). Failed executions cannot produce a [`StageOutput`], so they
    /// never get here.
    #[tracing::instrument(level = "debug", skip(self, output), fields(destination = %destination, key = %key))]
    pub async fn route(
        &self,
        output: &StageOutput,
        destination: DestinationTag,
        key: &str,
    ) -> Result<StoreKind, PipelineError> {
        self.persist(destination, key, output.payload().clone()).await
    }

    /// Writes a record that did not come from a process run (metric and
    /// event documents).
    pub async fn persist(
        &self,
        destination: DestinationTag,
        key: &str,
        record: serde_json::Value,
    ) -> Result<StoreKind, PipelineError> {
        let store = destination.store();
        let written = match store {
            StoreKind::Document => self.documents.insert(key, record).await,
            StoreKind::Relational => self.relational.insert(key, record).await,
        };

        written.map(|()| store).map_err(|e| PipelineError::RoutingFailed {
            destination,
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

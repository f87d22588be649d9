//! Interfaces to everything outside the orchestration core: the process
//! boundary, the metrics sink and the two stores.

use crate::execution::{ExecutionResult, ExecutionSpec};
use crate::metrics::MetricEvent;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Runs one external process. Implementations never retry.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn execute(&self, spec: &ExecutionSpec, timeout: Duration) -> ExecutionResult;
}

/// Destination of metric events. Must tolerate concurrent writers.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, event: &MetricEvent) -> Result<(), StoreError>;
}

/// Document store for raw and semi-structured data.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(
        &self,
        collection: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Relational store for structured and aggregated results.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn insert(
        &self,
        table: &str,
        record: serde_json::Value,
    ) -> Result<(), StoreError>;
}

//! In-process stand-ins for the external stores and metrics sink.

use async_trait::async_trait;
use pipeforge_core::{DocumentStore, MetricEvent, MetricsSink, RelationalStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Collections {
    entries: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    unavailable: AtomicBool,
}

impl Collections {
    async fn insert(&self, name: &str, value: serde_json::Value) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("cannot write to '{name}'")));
        }
        self.entries
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn get(&self, name: &str) -> Vec<serde_json::Value> {
        self.entries
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    async fn total(&self) -> usize {
        self.entries.lock().await.values().map(Vec::len).sum()
    }
}

/// Document store keeping documents per collection in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Collections,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.collections.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn documents(&self, collection: &str) -> Vec<serde_json::Value> {
        self.collections.get(collection).await
    }

    pub async fn total_documents(&self) -> usize {
        self.collections.total().await
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(
        &self,
        collection: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.collections.insert(collection, document).await
    }
}

/// Relational store keeping rows per table in memory.
#[derive(Default)]
pub struct MemoryRelationalStore {
    tables: Collections,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.tables.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.tables.get(table).await
    }

    pub async fn total_rows(&self) -> usize {
        self.tables.total().await
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn insert(&self, table: &str, record: serde_json::Value) -> Result<(), StoreError> {
        self.tables.insert(table, record).await
    }
}

/// Metrics sink collecting events in memory.
#[derive(Default)]
pub struct MemoryMetricsSink {
    events: Mutex<Vec<MetricEvent>>,
    unavailable: AtomicBool,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().await.clone()
    }

    pub async fn events_for(&self, component: &str) -> Vec<MetricEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.component == component)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemoryMetricsSink {
    async fn write(&self, event: &MetricEvent) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("metrics sink offline".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

//! # Model registry
//!
//! Lifecycle records for ML models plus per-model mutual exclusion: at most
//! one training/evaluation/deployment chain holds a model at a time, while
//! chains for different models proceed independently.

use chrono::Utc;
use pipeforge_core::{ModelRecord, ModelStatus, PipelineError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type LockMap = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

fn lock_map(locks: &LockMap) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive hold on one model id. Registry mutations require it.
///
/// Dropping the last lease on an id with no waiters forgets its lock.
pub struct ModelLease {
    model_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl ModelLease {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = lock_map(&self.locks);
        if locks
            .get(&self.model_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.model_id);
        }
    }
}

impl std::fmt::Debug for ModelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLease")
            .field("model_id", &self.model_id)
            .finish()
    }
}

#[derive(Default)]
pub struct ModelRegistry {
    records: RwLock<HashMap<String, ModelRecord>>,
    locks: LockMap,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `model_id`. Entries left behind by abandoned waiters are
    /// swept here.
    fn lock_for(&self, model_id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_map(&self.locks);
        locks.retain(|id, lock| id == model_id || Arc::strong_count(lock) > 1);
        locks.entry(model_id.to_string()).or_default().clone()
    }

    fn lease(&self, model_id: &str, guard: OwnedMutexGuard<()>) -> ModelLease {
        ModelLease {
            model_id: model_id.to_string(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Waits until no other chain holds `model_id`.
    pub async fn acquire(&self, model_id: &str) -> ModelLease {
        let guard = self.lock_for(model_id).lock_owned().await;
        tracing::debug!(model_id = %model_id, "model lease acquired");
        self.lease(model_id, guard)
    }

    /// Takes the lease only if it is free.
    pub async fn try_acquire(&self, model_id: &str) -> Result<ModelLease, PipelineError> {
        let guard = self.lock_for(model_id).try_lock_owned().map_err(|_| {
            PipelineError::RegistryConflict {
                model_id: model_id.to_string(),
                reason: "another chain holds this model".to_string(),
            }
        })?;
        Ok(self.lease(model_id, guard))
    }

    /// Model ids with a live lease or waiter.
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        lock_map(&self.locks).len()
    }

    /// Creates the record, or re-registers an existing one for a retrain:
    /// status back to REGISTERED, metrics and environment cleared, version
    /// bumped.
    pub async fn register(
        &self,
        lease: &ModelLease,
        metadata: serde_json::Value,
    ) -> ModelRecord {
        let mut records = self.records.write().await;
        let record = records
            .entry(lease.model_id.clone())
            .and_modify(|record| {
                record.status = ModelStatus::Registered;
                record.metrics.clear();
                record.environment = None;
                record.version += 1;
                record.metadata = metadata.clone();
                record.updated_at = Utc::now();
            })
            .or_insert_with(|| ModelRecord::registered(lease.model_id.clone(), metadata));

        tracing::info!(model_id = %record.model_id, version = record.version, "model registered");
        record.clone()
    }

    pub async fn mark_trained(
        &self,
        lease: &ModelLease,
        metrics: BTreeMap<String, f64>,
    ) -> Result<ModelRecord, PipelineError> {
        self.transition(lease, ModelStatus::Trained, |record| {
            record.metrics.extend(metrics);
        })
        .await
    }

    pub async fn mark_evaluated(
        &self,
        lease: &ModelLease,
        metrics: BTreeMap<String, f64>,
    ) -> Result<ModelRecord, PipelineError> {
        self.transition(lease, ModelStatus::Evaluated, |record| {
            record.metrics.extend(metrics);
        })
        .await
    }

    pub async fn mark_deployed(
        &self,
        lease: &ModelLease,
        environment: &str,
    ) -> Result<ModelRecord, PipelineError> {
        self.transition(lease, ModelStatus::Deployed, |record| {
            record.environment = Some(environment.to_string());
        })
        .await
    }

    async fn transition(
        &self,
        lease: &ModelLease,
        next: ModelStatus,
        update: impl FnOnce(&mut ModelRecord),
    ) -> Result<ModelRecord, PipelineError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&lease.model_id).ok_or_else(|| {
            PipelineError::RegistryConflict {
                model_id: lease.model_id.clone(),
                reason: "model is not registered".to_string(),
            }
        })?;

        if !record.status.can_transition_to(next) {
            return Err(PipelineError::RegistryConflict {
                model_id: lease.model_id.clone(),
                reason: format!("cannot move from {} to {}", record.status, next),
            });
        }

        update(record);
        record.status = next;
        record.updated_at = Utc::now();
        tracing::info!(model_id = %record.model_id, status = %next, "model status updated");
        Ok(record.clone())
    }

    /// Snapshot of one record.
    pub async fn get(&self, model_id: &str) -> Option<ModelRecord> {
        self.records.read().await.get(model_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn lifecycle_moves_forward() {
        let registry = ModelRegistry::new();
        let lease = registry.acquire("m1").await;

        registry.register(&lease, json!({"epochs": 3})).await;
        registry
            .mark_trained(&lease, BTreeMap::from([("loss".to_string(), 0.2)]))
            .await
            .unwrap();
        registry
            .mark_evaluated(&lease, BTreeMap::from([("accuracy".to_string(), 0.9)]))
            .await
            .unwrap();
        let record = registry.mark_deployed(&lease, "production").await.unwrap();

        assert_eq!(record.status, ModelStatus::Deployed);
        assert_eq!(record.environment.as_deref(), Some("production"));
        assert_eq!(record.metrics.len(), 2);
    }

    #[tokio::test]
    async fn skipping_a_status_is_a_conflict() {
        let registry = ModelRegistry::new();
        let lease = registry.acquire("m1").await;
        registry.register(&lease, json!({})).await;

        let err = registry.mark_deployed(&lease, "production").await.unwrap_err();
        assert_eq!(err.kind(), "RegistryConflict");
        assert_eq!(
            registry.get("m1").await.unwrap().status,
            ModelStatus::Registered
        );
    }

    #[tokio::test]
    async fn reregistration_bumps_version() {
        let registry = ModelRegistry::new();
        let lease = registry.acquire("m1").await;
        registry.register(&lease, json!({})).await;
        registry
            .mark_trained(&lease, BTreeMap::from([("loss".to_string(), 0.1)]))
            .await
            .unwrap();

        let record = registry.register(&lease, json!({"retrain": true})).await;
        assert_eq!(record.version, 2);
        assert_eq!(record.status, ModelStatus::Registered);
        assert!(record.metrics.is_empty());
    }

    #[tokio::test]
    async fn lease_is_exclusive_per_model() {
        let registry = Arc::new(ModelRegistry::new());
        let lease = registry.acquire("m1").await;

        assert_eq!(
            registry.try_acquire("m1").await.unwrap_err().kind(),
            "RegistryConflict"
        );
        assert!(registry.try_acquire("m2").await.is_ok());

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("m1").await.model_id().to_string() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        assert_eq!(waiter.await.unwrap(), "m1");
    }

    #[tokio::test]
    async fn released_leases_leave_no_locks_behind() {
        let registry = ModelRegistry::new();
        for i in 0..1000 {
            let lease = registry.acquire(&format!("model-{i}")).await;
            drop(lease);
        }
        assert_eq!(registry.tracked_locks(), 0);

        let lease = registry.try_acquire("m1").await.unwrap();
        assert_eq!(registry.tracked_locks(), 1);
        drop(lease);
        assert_eq!(registry.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn lock_survives_while_a_waiter_is_queued() {
        let registry = Arc::new(ModelRegistry::new());
        let lease = registry.acquire("m1").await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let lease = registry.acquire("m1").await;
                lease.model_id().to_string()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(lease);
        assert_eq!(waiter.await.unwrap(), "m1");
        assert_eq!(registry.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn aborted_waiter_does_not_pin_lock() {
        let registry = Arc::new(ModelRegistry::new());
        let lease = registry.acquire("m1").await;
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.acquire("m1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(lease);
        registry.acquire("m2").await;
        assert_eq!(registry.tracked_locks(), 0);
    }
}

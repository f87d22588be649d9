use pipeforge_config::EngineConfig;
use pipeforge_core::{ConfigMap, Domain};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-domain default task configuration.
#[derive(Default)]
pub struct TaskConfigRegistry {
    defaults: RwLock<HashMap<Domain, ConfigMap>>,
}

impl TaskConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry from `task_defaults`. Unknown domain names are
    /// skipped with a warning.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut defaults = HashMap::new();
        for (name, values) in &config.task_defaults {
            match name.parse::<Domain>() {
                Ok(domain) => {
                    defaults.insert(domain, values.clone());
                }
                Err(e) => tracing::warn!(error = %e, "ignoring task defaults"),
            }
        }
        Self {
            defaults: RwLock::new(defaults),
        }
    }

    pub async fn workflow_config(&self, domain: Domain) -> ConfigMap {
        self.defaults
            .read()
            .await
            .get(&domain)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn update_config(&self, domain: Domain, config: ConfigMap) {
        tracing::info!(domain = %domain, keys = config.len(), "task defaults updated");
        self.defaults.write().await.insert(domain, config);
    }

    /// Request config in its own order, followed by defaults it does not
    /// override.
    pub async fn merged(&self, domain: Domain, request: &ConfigMap) -> ConfigMap {
        let mut merged = request.clone();
        if let Some(defaults) = self.defaults.read().await.get(&domain) {
            for (key, value) in defaults {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}

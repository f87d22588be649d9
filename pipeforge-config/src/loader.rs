use crate::config::{EngineConfig, TASK_TYPE_PLACEHOLDER};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Engine configuration loader for YAML and JSON sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads a file, picking the format from its extension (`.json` is JSON,
    /// anything else YAML), then validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let path = path.as_ref();
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path)?,
            _ => Self::from_yaml_file(path)?,
        };
        Self::validate(&config)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read YAML file: {:?}", path.as_ref())
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<EngineConfig> {
        serde_yaml::from_str(content)
            .with_context(|| "Failed to parse YAML content")
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read JSON file: {:?}", path.as_ref())
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<EngineConfig> {
        serde_json::from_str(content)
            .with_context(|| "Failed to parse JSON content")
    }

    pub fn save_to_yaml<P: AsRef<Path>>(
        config: &EngineConfig,
        path: P,
    ) -> Result<()> {
        let yaml_content = serde_yaml::to_string(config)
            .with_context(|| "Failed to serialize config to YAML")?;

        fs::write(&path, yaml_content).with_context(|| {
            format!("Failed to write YAML file: {:?}", path.as_ref())
        })?;

        Ok(())
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(config: &EngineConfig) -> Result<()> {
        if config.executor.max_concurrent_processes == 0 {
            return Err(anyhow::anyhow!(
                "executor.max_concurrent_processes must be at least 1"
            ));
        }

        if config.executor.timeout_secs == 0 {
            return Err(anyhow::anyhow!("executor.timeout_secs must be positive"));
        }

        if config.scheduler.enabled && config.scheduler.period_secs == 0 {
            return Err(anyhow::anyhow!("scheduler.period_secs must be positive"));
        }

        let threshold = config.ml.deploy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow::anyhow!(
                "ml.deploy_threshold must be within [0, 1], got {}",
                threshold
            ));
        }

        if !config.scripts.automated.contains(TASK_TYPE_PLACEHOLDER) {
            return Err(anyhow::anyhow!(
                "scripts.automated must contain {}",
                TASK_TYPE_PLACEHOLDER
            ));
        }

        for domain in config.task_defaults.keys() {
            if !KNOWN_DOMAINS.contains(&domain.as_str()) {
                return Err(anyhow::anyhow!(
                    "task_defaults has unknown domain '{}'",
                    domain
                ));
            }
        }

        Ok(())
    }
}

const KNOWN_DOMAINS: [&str; 5] = [
    "analytics",
    "data-collection",
    "ml-training",
    "workflow",
    "automated",
];

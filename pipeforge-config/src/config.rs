use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder substituted with the task type in the automated script path.
pub const TASK_TYPE_PLACEHOLDER: &str = "{task_type}";

/// Complete engine configuration; every section is optional in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub scripts: ScriptSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub ml: MlSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Default config per domain (keyed by domain name, e.g. `analytics`),
    /// merged under each request's own config.
    #[serde(default)]
    pub task_defaults: IndexMap<String, IndexMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Interpreter placed before the script path; `None` runs scripts
    /// directly.
    #[serde(default = "default_interpreter")]
    pub interpreter: Option<String>,
    #[serde(default = "default_applications_root")]
    pub applications_root: PathBuf,
    #[serde(default = "default_max_concurrent_processes")]
    pub max_concurrent_processes: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ExecutorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            applications_root: default_applications_root(),
            max_concurrent_processes: default_max_concurrent_processes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Script paths relative to the applications root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub analytics: String,
    pub scraping: String,
    /// Must contain [`TASK_TYPE_PLACEHOLDER`].
    pub automated: String,
    pub training: String,
    pub evaluation: String,
    /// Optional script run before a model is marked deployed.
    pub deployment: Option<String>,
    pub workflow_scrape: String,
    pub workflow_train: String,
}

impl ScriptSettings {
    pub fn automated_for(&self, task_type: &str) -> String {
        self.automated.replace(TASK_TYPE_PLACEHOLDER, task_type)
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            analytics: "applications/core_analytics/analyze.py".to_string(),
            scraping: "applications/core_scraping/scrape.py".to_string(),
            automated: format!(
                "applications/workflows_automated/{TASK_TYPE_PLACEHOLDER}/execute.py"
            ),
            training: "ml_analytics/models/training/train.py".to_string(),
            evaluation: "ml_analytics/models/evaluation/evaluate.py".to_string(),
            deployment: None,
            workflow_scrape: "applications/core_scraping/scrape.py".to_string(),
            workflow_train: "ml_analytics/models/training/train.py".to_string(),
        }
    }
}

/// Collection and table names for routed results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub raw_collection: String,
    pub analytics_table: String,
    pub automated_table: String,
    pub evaluation_table: String,
    pub workflow_collection: String,
    pub workflow_table: String,
    pub metrics_collection: String,
    pub events_collection: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            raw_collection: "scraped_data".to_string(),
            analytics_table: "analytics_results".to_string(),
            automated_table: "automated_tasks".to_string(),
            evaluation_table: "model_evaluations".to_string(),
            workflow_collection: "scrapedData".to_string(),
            workflow_table: "training_results".to_string(),
            metrics_collection: "system_metrics".to_string(),
            events_collection: "events".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlSettings {
    /// Evaluation accuracy must be strictly greater than this to deploy.
    pub deploy_threshold: f64,
    pub accuracy_metric: String,
    pub deploy_environment: String,
}

impl Default for MlSettings {
    fn default() -> Self {
        Self {
            deploy_threshold: 0.85,
            accuracy_metric: "accuracy".to_string(),
            deploy_environment: "production".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub period_secs: u64,
    pub task_type: String,
    pub config: IndexMap<String, serde_json::Value>,
}

impl SchedulerSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let mut config = IndexMap::new();
        config.insert("scheduled".to_string(), serde_json::Value::Bool(true));
        Self {
            enabled: true,
            period_secs: 3600,
            task_type: "scheduled_processing".to_string(),
            config,
        }
    }
}

fn default_interpreter() -> Option<String> {
    Some("python".to_string())
}

fn default_applications_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_concurrent_processes() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    600
}

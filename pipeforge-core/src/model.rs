use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    Registered,
    Trained,
    Evaluated,
    Deployed,
}

impl ModelStatus {
    /// Whether the ML chain may move a record from `self` to `next`.
    pub fn can_transition_to(&self, next: ModelStatus) -> bool {
        matches!(
            (self, next),
            (ModelStatus::Registered, ModelStatus::Trained)
                | (ModelStatus::Trained, ModelStatus::Evaluated)
                | (ModelStatus::Evaluated, ModelStatus::Deployed)
        )
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelStatus::Registered => "REGISTERED",
            ModelStatus::Trained => "TRAINED",
            ModelStatus::Evaluated => "EVALUATED",
            ModelStatus::Deployed => "DEPLOYED",
        };
        f.write_str(name)
    }
}

/// Registry entry for one model's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub status: ModelStatus,
    pub metrics: BTreeMap<String, f64>,
    pub environment: Option<String>,
    /// Bumped on every registration; the lineage of retrains.
    pub version: u32,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn registered(model_id: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            model_id: model_id.into(),
            status: ModelStatus::Registered,
            metrics: BTreeMap::new(),
            environment: None,
            version: 1,
            metadata,
            updated_at: Utc::now(),
        }
    }
}

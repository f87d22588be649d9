use crate::error::PipelineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Request configuration, kept in insertion order so the argument vector
/// built from it is reproducible.
pub type ConfigMap = IndexMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Analytics,
    DataCollection,
    MlTraining,
    Workflow,
    Automated,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Analytics,
        Domain::DataCollection,
        Domain::MlTraining,
        Domain::Workflow,
        Domain::Automated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Analytics => "analytics",
            Domain::DataCollection => "data-collection",
            Domain::MlTraining => "ml-training",
            Domain::Workflow => "workflow",
            Domain::Automated => "automated",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| {
                PipelineError::InvalidRequest(format!("unknown domain '{s}'"))
            })
    }
}

/// One inbound task. Consumed by exactly one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub request_id: String,
    pub domain: Domain,
    /// Pipeline id, scrape source, task type or model id depending on the
    /// domain.
    pub identifier: String,
    #[serde(default)]
    pub config: ConfigMap,
}

impl TaskRequest {
    pub fn new(
        domain: Domain,
        identifier: impl Into<String>,
        config: ConfigMap,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            domain,
            identifier: identifier.into(),
            config,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.identifier.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "{} request has an empty identifier",
                self.domain
            )));
        }
        if self.identifier.contains(&['/', '\\'][..]) || self.identifier == ".." {
            return Err(PipelineError::InvalidRequest(format!(
                "identifier '{}' must not contain path separators",
                self.identifier
            )));
        }
        Ok(())
    }
}

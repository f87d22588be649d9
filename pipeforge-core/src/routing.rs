use serde::{Deserialize, Serialize};
use std::fmt;

/// Label chosen by an orchestrator for where a result belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationTag {
    Raw,
    Processed,
    TaskResult,
    Metric,
    Event,
}

/// The two persistence back-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    Document,
    Relational,
}

impl DestinationTag {
    /// Routing decision: raw scrape output and monitoring records go to the
    /// document store, derived results to the relational store.
    pub fn store(&self) -> StoreKind {
        match self {
            DestinationTag::Raw | DestinationTag::Metric | DestinationTag::Event => {
                StoreKind::Document
            }
            DestinationTag::Processed | DestinationTag::TaskResult => {
                StoreKind::Relational
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationTag::Raw => "raw",
            DestinationTag::Processed => "processed",
            DestinationTag::TaskResult => "task-result",
            DestinationTag::Metric => "metric",
            DestinationTag::Event => "event",
        }
    }
}

impl fmt::Display for DestinationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

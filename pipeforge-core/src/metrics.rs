use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Metric,
    Event,
}

/// Append-only monitoring record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub component: String,
    pub kind: MetricKind,
    pub attributes: IndexMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl MetricEvent {
    pub fn metric(
        component: impl Into<String>,
        attributes: IndexMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            component: component.into(),
            kind: MetricKind::Metric,
            attributes,
            timestamp: Utc::now(),
        }
    }

    pub fn event(
        event_type: impl Into<String>,
        attributes: IndexMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            component: event_type.into(),
            kind: MetricKind::Event,
            attributes,
            timestamp: Utc::now(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "component": self.component,
            "kind": self.kind,
            "attributes": self.attributes,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

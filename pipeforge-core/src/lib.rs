//! # PipeForge Core
//!
//! Data model, error taxonomy, collaborator interfaces and the sequential
//! stage chain shared by every pipeline orchestrator.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod chain;
pub mod collaborators;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod model;
pub mod request;
pub mod routing;

#[cfg(test)]
mod tests;

pub use chain::{Chain, ChainBuilder, Stage, StageFuture};
pub use collaborators::{
    DocumentStore, MetricsSink, ProcessRunner, RelationalStore, StoreError,
};
pub use error::{PipelineError, Result};
pub use execution::{
    ExecutionResult, ExecutionSpec, FailureKind, StageOutput,
    SENTINEL_EXIT_CODE,
};
pub use metrics::{MetricEvent, MetricKind};
pub use model::{ModelRecord, ModelStatus};
pub use request::{ConfigMap, Domain, TaskRequest};
pub use routing::{DestinationTag, StoreKind};

/// Prelude module for core functionality
pub mod prelude {
    pub use crate::{
        Chain, ChainBuilder, ConfigMap, DestinationTag, Domain,
        ExecutionResult, ExecutionSpec, PipelineError, StageOutput,
        TaskRequest,
    };
    pub use pipeforge_context::{PipelineContext, PipelineState, SharedContext};
}

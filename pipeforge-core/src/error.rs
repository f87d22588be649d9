use crate::routing::DestinationTag;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every way a pipeline stage can fail.
///
/// A failure aborts only the chain that produced it; the scheduler and
/// other in-flight pipelines are unaffected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("failed to launch '{executable}': {detail}")]
    LaunchFailed { executable: String, detail: String },

    #[error("'{executable}' timed out: {detail}")]
    TimedOut { executable: String, detail: String },

    #[error("'{executable}' exited with code {code}: {stderr}")]
    NonZeroExit {
        executable: String,
        code: i32,
        stderr: String,
    },

    #[error("routing to {destination} '{key}' failed: {reason}")]
    RoutingFailed {
        destination: DestinationTag,
        key: String,
        reason: String,
    },

    #[error("registry conflict on model '{model_id}': {reason}")]
    RegistryConflict { model_id: String, reason: String },

    #[error("stage '{stage}' was cancelled")]
    Cancelled { stage: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Stable tag used in metric events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::LaunchFailed { .. } => "LaunchFailed",
            PipelineError::TimedOut { .. } => "TimedOut",
            PipelineError::NonZeroExit { .. } => "NonZeroExit",
            PipelineError::RoutingFailed { .. } => "RoutingFailed",
            PipelineError::RegistryConflict { .. } => "RegistryConflict",
            PipelineError::Cancelled { .. } => "Cancelled",
            PipelineError::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// Failures produced by the external process itself.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::LaunchFailed { .. }
                | PipelineError::TimedOut { .. }
                | PipelineError::NonZeroExit { .. }
        )
    }
}

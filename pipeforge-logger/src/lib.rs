//! # PipeForge Logger
//!
//! Tracing subscriber setup and pipeline summary logging

use pipeforge_context::{PipelineContext, StageStatus};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Logger bound to one trace id
pub struct Logger {
    pub trace_id: String,
}

impl Logger {
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
        }
    }

    /// Initialize the global tracing subscriber. `RUST_LOG` wins over the
    /// `info` default; `json` switches to structured JSON lines.
    ///
    /// Safe to call more than once; later calls are ignored.
    pub fn init_tracing(json: bool) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            debug!("tracing subscriber already initialized");
        }
    }

    pub fn info(&self, message: &str) {
        info!(trace_id = %self.trace_id, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(trace_id = %self.trace_id, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(trace_id = %self.trace_id, "{}", message);
    }

    /// Log pipeline context summary
    pub fn log_pipeline_summary(&self, context: &PipelineContext) {
        info!(
            trace_id = %context.trace_id,
            state = %context.state,
            total_stages = context.stage_logs.len(),
            success = context.count_by_status(StageStatus::Success),
            failed = context.count_by_status(StageStatus::Failed),
            skipped = context.count_by_status(StageStatus::Skipped),
            timeout = context.count_by_status(StageStatus::Timeout),
            errors = context.errors.len(),
            "Pipeline execution summary"
        );

        for error in &context.errors {
            error!(trace_id = %context.trace_id, "Pipeline error: {}", error);
        }
    }

    /// Log stage execution details
    pub fn log_stage_details(&self, context: &PipelineContext) {
        for stage_log in &context.stage_logs {
            let duration_ms = stage_log.duration().as_millis() as u64;

            match stage_log.status {
                StageStatus::Success => {
                    debug!(
                        trace_id = %stage_log.trace_id,
                        stage = %stage_log.stage_name,
                        duration_ms,
                        "Stage completed successfully"
                    );
                }
                StageStatus::Failed | StageStatus::Timeout => {
                    error!(
                        trace_id = %stage_log.trace_id,
                        stage = %stage_log.stage_name,
                        duration_ms,
                        error = %stage_log.error_message.as_deref().unwrap_or("Unknown error"),
                        "Stage failed"
                    );
                }
                StageStatus::Skipped => {
                    debug!(
                        trace_id = %stage_log.trace_id,
                        stage = %stage_log.stage_name,
                        "Stage skipped"
                    );
                }
                StageStatus::Running => {
                    warn!(
                        trace_id = %stage_log.trace_id,
                        stage = %stage_log.stage_name,
                        "Stage still running"
                    );
                }
            }
        }
    }
}


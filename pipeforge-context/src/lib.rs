//! # PipeForge Context
//!
//! Per-pipeline execution context: trace id, the stage state machine,
//! stage logs and the variables stages hand to each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub trace_id: String,
    pub state: PipelineState,
    pub errors: Vec<String>,
    pub stage_logs: Vec<StageLog>,
    pub variables: HashMap<String, serde_json::Value>,
}

/// Lifecycle of one pipeline chain.
///
/// `Pending -> StageRunning(0) -> StageDone(0) -> StageRunning(1) -> ... ->
/// Complete`, or `Failed` from any running stage. Terminal states are never
/// left again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    StageRunning { index: usize, stage: String },
    StageDone { index: usize, stage: String },
    Complete,
    Failed { stage: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Pending => write!(f, "PENDING"),
            PipelineState::StageRunning { index, stage } => {
                write!(f, "STAGE_{index}_RUNNING({stage})")
            }
            PipelineState::StageDone { index, stage } => {
                write!(f, "STAGE_{index}_DONE({stage})")
            }
            PipelineState::Complete => write!(f, "COMPLETE"),
            PipelineState::Failed { stage } => write!(f, "FAILED({stage})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageLog {
    pub stage_name: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub status: StageStatus,
    pub error_message: Option<String>,
    pub trace_id: String,
}

impl StageLog {
    pub fn duration(&self) -> Duration {
        self.end_time
            .map(|end| end.duration_since(self.start_time))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    Success,
    Failed,
    Skipped,
    Timeout,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new_with_trace_id(Uuid::new_v4().to_string())
    }
}

impl PipelineContext {
    pub fn new_with_trace_id(trace_id: String) -> Self {
        Self {
            trace_id,
            state: PipelineState::Pending,
            errors: Vec::new(),
            stage_logs: Vec::new(),
            variables: HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the chain into `StageRunning` for the next stage.
    ///
    /// Fails when the chain already reached a terminal state or another
    /// stage is still running.
    pub fn start_stage(&mut self, stage_name: &str) -> Result<usize, String> {
        let index = match &self.state {
            PipelineState::Pending => 0,
            PipelineState::StageDone { index, .. } => index + 1,
            PipelineState::StageRunning { stage, .. } => {
                return Err(format!(
                    "cannot start '{stage_name}' while '{stage}' is running"
                ));
            }
            terminal => {
                return Err(format!(
                    "cannot start '{stage_name}': pipeline already {terminal}"
                ));
            }
        };

        self.state = PipelineState::StageRunning {
            index,
            stage: stage_name.to_string(),
        };
        self.stage_logs.push(StageLog {
            stage_name: stage_name.to_string(),
            start_time: Instant::now(),
            end_time: None,
            status: StageStatus::Running,
            error_message: None,
            trace_id: self.trace_id.clone(),
        });

        tracing::info!(trace_id = %self.trace_id, stage = %stage_name, index, "stage starting");
        Ok(index)
    }

    pub fn end_stage_success(&mut self, stage_name: &str) {
        if let Some(duration) =
            self.close_log(stage_name, StageStatus::Success, None)
        {
            tracing::info!(trace_id = %self.trace_id, stage = %stage_name, duration_ms = duration.as_millis() as u64, "stage success");
        }
        if let PipelineState::StageRunning { index, stage } = &self.state {
            if stage == stage_name {
                self.state = PipelineState::StageDone {
                    index: *index,
                    stage: stage.clone(),
                };
            }
        }
    }

    pub fn end_stage_failed(&mut self, stage_name: &str, error: &str) {
        if let Some(duration) = self.close_log(
            stage_name,
            StageStatus::Failed,
            Some(error.to_string()),
        ) {
            tracing::error!(trace_id = %self.trace_id, stage = %stage_name, duration_ms = duration.as_millis() as u64, error = %error, "stage failed");
        }
        self.fail(stage_name, error);
    }

    pub fn end_stage_timeout(&mut self, stage_name: &str) {
        if let Some(duration) = self.close_log(
            stage_name,
            StageStatus::Timeout,
            Some("timed out".to_string()),
        ) {
            tracing::error!(trace_id = %self.trace_id, stage = %stage_name, duration_ms = duration.as_millis() as u64, "stage timeout");
        }
        self.fail(stage_name, "timed out");
    }

    /// Records a stage that was deliberately not run. The chain position
    /// does not advance.
    pub fn skip_stage(&mut self, stage_name: &str, reason: &str) {
        let now = Instant::now();
        self.stage_logs.push(StageLog {
            stage_name: stage_name.to_string(),
            start_time: now,
            end_time: Some(now),
            status: StageStatus::Skipped,
            error_message: None,
            trace_id: self.trace_id.clone(),
        });
        tracing::warn!(trace_id = %self.trace_id, stage = %stage_name, reason = %reason, "stage skipped");
    }

    /// Marks the chain complete. A failed chain stays failed.
    pub fn complete(&mut self) {
        match self.state {
            PipelineState::Pending | PipelineState::StageDone { .. } => {
                self.state = PipelineState::Complete;
                tracing::info!(trace_id = %self.trace_id, stages = self.stage_logs.len(), "pipeline complete");
            }
            _ => {}
        }
    }

    fn fail(&mut self, stage_name: &str, error: &str) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed {
                stage: stage_name.to_string(),
            };
        }
        self.errors
            .push(format!("[{}] {}: {}", self.trace_id, stage_name, error));
    }

    fn close_log(
        &mut self,
        stage_name: &str,
        status: StageStatus,
        error_message: Option<String>,
    ) -> Option<Duration> {
        let log = self.stage_logs.iter_mut().rev().find(|log| {
            log.stage_name == stage_name && log.status == StageStatus::Running
        })?;
        let end = Instant::now();
        log.end_time = Some(end);
        log.status = status;
        log.error_message = error_message;
        Some(end.duration_since(log.start_time))
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        tracing::debug!(trace_id = %self.trace_id, key = %key, value = %value, "set variable");

        self.variables.insert(key, value);
    }

    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    pub fn count_by_status(&self, status: StageStatus) -> usize {
        self.stage_logs
            .iter()
            .filter(|log| log.status == status)
            .count()
    }
}

pub type SharedContext = Arc<Mutex<PipelineContext>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_through_states() {
        let mut ctx = PipelineContext::default();
        assert_eq!(ctx.start_stage("register"), Ok(0));
        ctx.end_stage_success("register");
        assert_eq!(
            ctx.state,
            PipelineState::StageDone {
                index: 0,
                stage: "register".to_string()
            }
        );
        assert_eq!(ctx.start_stage("train"), Ok(1));
        ctx.end_stage_success("train");
        ctx.complete();
        assert_eq!(ctx.state, PipelineState::Complete);
        assert_eq!(ctx.count_by_status(StageStatus::Success), 2);
    }

    #[test]
    fn failed_chain_cannot_resume() {
        let mut ctx = PipelineContext::default();
        ctx.start_stage("train").unwrap();
        ctx.end_stage_failed("train", "exit 1");
        assert!(matches!(ctx.state, PipelineState::Failed { .. }));
        assert!(ctx.start_stage("evaluate").is_err());

        ctx.complete();
        assert_eq!(
            ctx.state,
            PipelineState::Failed {
                stage: "train".to_string()
            }
        );
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn cannot_start_while_running() {
        let mut ctx = PipelineContext::default();
        ctx.start_stage("scrape").unwrap();
        assert!(ctx.start_stage("train").is_err());
    }

    #[test]
    fn timeout_marks_failed() {
        let mut ctx = PipelineContext::default();
        ctx.start_stage("scrape").unwrap();
        ctx.end_stage_timeout("scrape");
        assert!(ctx.is_terminal());
        assert_eq!(ctx.count_by_status(StageStatus::Timeout), 1);
    }

    #[test]
    fn skipped_stage_does_not_advance() {
        let mut ctx = PipelineContext::default();
        ctx.start_stage("evaluate").unwrap();
        ctx.end_stage_success("evaluate");
        ctx.skip_stage("deploy", "below threshold");
        ctx.complete();
        assert_eq!(ctx.state, PipelineState::Complete);
        assert_eq!(ctx.count_by_status(StageStatus::Skipped), 1);
    }
}

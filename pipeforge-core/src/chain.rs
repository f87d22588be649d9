use crate::error::{PipelineError, Result};
use pipeforge_context::{PipelineContext, SharedContext};
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Type alias for stage functions
pub type StageFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Stage = Box<dyn FnOnce(SharedContext) -> StageFuture + Send>;

type Condition = Box<dyn Fn(&PipelineContext) -> bool + Send + Sync>;

struct NamedStage {
    name: String,
    condition: Option<Condition>,
    run: Stage,
}

/// Builder for an ordered chain of stages where each stage only starts
/// after its predecessor succeeded.
pub struct ChainBuilder {
    stages: Vec<NamedStage>,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Adds a named stage; its outcome is logged on the pipeline context.
    pub fn stage<Fut, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(SharedContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.stages.push(NamedStage {
            name: name.into(),
            condition: None,
            run: Box::new(move |ctx| Box::pin(f(ctx))),
        });
        self
    }

    /// Adds a stage that only runs when `cond` holds once its predecessors
    /// are done. A stage whose condition fails is logged as skipped.
    pub fn stage_if<Fut, F, Cond>(
        mut self,
        name: impl Into<String>,
        cond: Cond,
        f: F,
    ) -> Self
    where
        Cond: Fn(&PipelineContext) -> bool + Send + Sync + 'static,
        F: FnOnce(SharedContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.stages.push(NamedStage {
            name: name.into(),
            condition: Some(Box::new(cond)),
            run: Box::new(move |ctx| Box::pin(f(ctx))),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn build(self) -> Chain {
        Chain {
            stages: self.stages,
        }
    }
}

/// A built chain, runnable once.
pub struct Chain {
    stages: Vec<NamedStage>,
}

impl Chain {
    /// Runs the chain on a fresh context and returns it.
    pub async fn execute(self) -> (PipelineContext, Result<()>) {
        let shared = Arc::new(Mutex::new(PipelineContext::default()));
        let result = self.run(shared.clone(), CancellationToken::new()).await;
        let context = shared.lock().await.clone();
        (context, result)
    }

    /// Runs the stages in order, short-circuiting on the first failure.
    ///
    /// Cancelling `cancel` drops the running stage's future (which kills any
    /// child process it owns) and fails the chain with
    /// [`PipelineError::Cancelled`].
    pub async fn run(
        self,
        context: SharedContext,
        cancel: CancellationToken,
    ) -> Result<()> {
        let total = self.stages.len();
        for (position, stage) in self.stages.into_iter().enumerate() {
            let remaining = total - position - 1;
            let NamedStage {
                name,
                condition,
                run,
            } = stage;

            {
                let mut guard = context.lock().await;
                if let Some(cond) = &condition {
                    if !cond(&guard) {
                        guard.skip_stage(&name, "condition not met");
                        continue;
                    }
                }
                guard
                    .start_stage(&name)
                    .map_err(PipelineError::InvalidRequest)?;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage: name.clone() }),
                result = run(context.clone()) => result,
            };

            let mut guard = context.lock().await;
            match &result {
                Ok(()) => guard.end_stage_success(&name),
                Err(PipelineError::TimedOut { .. }) => guard.end_stage_timeout(&name),
                Err(e) => guard.end_stage_failed(&name, &e.to_string()),
            }
            if let Err(e) = &result {
                tracing::warn!(
                    trace_id = %guard.trace_id,
                    stage = %name,
                    kind = e.kind(),
                    remaining,
                    "chain stopped"
                );
            }
            drop(guard);
            result?;
        }

        context.lock().await.complete();
        Ok(())
    }
}

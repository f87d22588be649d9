//! # PipeForge Runtime
//!
//! Everything that moves a task request through its pipeline: the bounded
//! process executor, the fire-and-forget metrics recorder, the result
//! router, the model and task-config registries, the parameterized
//! orchestrator with its per-domain stage plans, the submission dispatcher
//! and the scheduled trigger.

mod dispatcher;
mod executor;
mod memory;
mod metrics;
mod orchestrator;
mod plans;
mod registry;
mod router;
mod scheduler;
mod stage;
mod task_config;
pub mod testing;


pub use dispatcher::{Acknowledgement, TaskDispatcher};
pub use executor::{ExecutorConfig, ProcessExecutor};
pub use memory::{MemoryDocumentStore, MemoryMetricsSink, MemoryRelationalStore};
pub use metrics::{attributes, DocumentMetricsSink, MetricsRecorder};
pub use orchestrator::{BranchReport, MlPolicy, PipelineOrchestrator, PipelineReport};
pub use plans::{PipelinePlan, StageTemplate};
pub use registry::{ModelLease, ModelRegistry};
pub use router::ResultRouter;
pub use scheduler::{ScheduledTrigger, TickOutcome, TriggerConfig, TriggerStats, MIN_PERIOD};
pub use stage::{ScriptInvocation, StageRuntime};
pub use task_config::TaskConfigRegistry;

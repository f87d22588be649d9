//! # PipeForge - Task Orchestration for Data and ML Pipelines
//!
//! PipeForge turns task requests into chains of external script runs: each
//! stage is executed on a bounded process pool, instrumented with metrics
//! and its output routed to a document or relational store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeforge::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let orchestrator = PipelineOrchestrator::from_config(
//!         config.clone(),
//!         Arc::new(ProcessExecutor::with_config((&config.executor).into())),
//!         Arc::new(MemoryDocumentStore::new()),
//!         Arc::new(MemoryRelationalStore::new()),
//!     );
//!
//!     let report = orchestrator
//!         .run(TaskRequest::new(Domain::DataCollection, "news_site", ConfigMap::new()))
//!         .await;
//!     println!("succeeded: {}", report.succeeded());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use pipeforge_config as config;
pub use pipeforge_context as context;
pub use pipeforge_core::*;
pub use pipeforge_logger as logger;
pub use pipeforge_runtime as runtime;

/// Prelude module for easy imports
pub mod prelude {
    pub use pipeforge_config::prelude::*;
    pub use pipeforge_core::prelude::*;
    pub use pipeforge_core::{ModelRecord, ModelStatus};
    pub use pipeforge_logger::Logger;
    pub use pipeforge_runtime::{
        Acknowledgement, MemoryDocumentStore, MemoryRelationalStore,
        MetricsRecorder, MlPolicy, PipelineOrchestrator, PipelineReport,
        ProcessExecutor, ScheduledTrigger, TaskDispatcher, TriggerConfig,
    };
}

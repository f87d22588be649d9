//! # PipeForge Config
//!
//! Engine configuration: process execution, script locations, store
//! names, ML deployment policy and the scheduled trigger.

pub mod config;
pub mod loader;

pub use config::{
    EngineConfig, ExecutorSettings, MlSettings, SchedulerSettings,
    ScriptSettings, StorageSettings, TASK_TYPE_PLACEHOLDER,
};
pub use loader::ConfigLoader;

/// Prelude module for easy imports
pub mod prelude {
    pub use crate::{ConfigLoader, EngineConfig};
}

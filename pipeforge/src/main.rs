use anyhow::{Context, Result};
use clap::Parser;
use pipeforge::prelude::*;
use pipeforge::runtime::TickOutcome;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs the scheduled automated-task trigger.
#[derive(Debug, Parser)]
#[command(name = "pipeforge", version, about)]
struct Args {
    /// Engine configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fire a single tick, wait for it and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    Logger::init_tracing(args.json_logs);

    let config = match &args.config {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let executor = Arc::new(ProcessExecutor::with_config((&config.executor).into()));
    let orchestrator = PipelineOrchestrator::from_config(
        config.clone(),
        executor,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryRelationalStore::new()),
    );
    let trigger = ScheduledTrigger::new(orchestrator.clone(), TriggerConfig::from(&config.scheduler));

    if args.once {
        if let TickOutcome::Started(handle) = trigger.tick() {
            let report = handle.await.context("scheduled run panicked")?;
            tracing::info!(request_id = %report.request_id, succeeded = report.succeeded(), "scheduled run finished");
        }
        orchestrator.metrics().flush().await;
        return Ok(());
    }

    if !config.scheduler.enabled {
        tracing::warn!("scheduler disabled in configuration, nothing to do");
        return Ok(());
    }

    let handle = trigger.start();
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    trigger.stop();
    handle.await.context("scheduler loop panicked")?;
    orchestrator.metrics().flush().await;
    Ok(())
}

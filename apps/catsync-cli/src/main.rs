//! # catsync
//!
//! Command-line front end for the catalog synchronization engine.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          catsync Startup                                │
//! │                                                                         │
//! │  1. Initialize Logging ──► EnvFilter (RUST_LOG, default "info")        │
//! │  2. Load EngineConfig  ──► engine.toml + CATSYNC_* env overrides        │
//! │  3. Load Fixture       ──► catalog, ledger, grants, schema              │
//! │  4. Start Job Worker   ──► tokio task draining submitted executions     │
//! │  5. Run Command        ──► JSON on stdout                               │
//! │  6. Dispatch commands wait for their executions, then shut down        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod commands;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use catsync_core::{AccessContext, ExecutionId, ExecutionKind, JobRuntime, Principal};
use catsync_engine::{Collaborators, EngineConfig, SyncEngine};
use catsync_store::{CatalogFixture, QueuedJobRuntime};

use crate::cli::Cli;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = EngineConfig::load(cli.config.clone()).context("loading engine config")?;
    let parts = CatalogFixture::load(&cli.fixture)
        .and_then(CatalogFixture::build)
        .with_context(|| format!("loading fixture {}", cli.fixture.display()))?;
    info!(fixture = %cli.fixture.display(), items = parts.catalog.item_count(), "Fixture loaded");

    let (jobs, worker, worker_handle) = QueuedJobRuntime::new(ExecutionKind::VersionSync);
    for (rule, count) in parts.completed_executions {
        jobs.record_completed(rule, count);
    }
    let jobs = Arc::new(jobs);
    let worker_task = tokio::spawn(worker.run());

    let catalog = Arc::new(parts.catalog);
    let ports = Collaborators {
        schema: Arc::new(parts.schema),
        catalog: catalog.clone(),
        ledger: Arc::new(parts.ledger),
        values: catalog.clone(),
        authorizer: Arc::new(parts.authorization),
        jobs: jobs.clone(),
    };
    let engine = SyncEngine::new(ports, config)?;
    let ctx = AccessContext::new(Principal::new(cli.principal.clone()));

    let dispatches = cli.command.dispatches();
    let output = commands::run(cli.command, &engine, catalog.as_ref(), &ctx)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if dispatches {
        let submitted: Vec<ExecutionId> = jobs.submissions().iter().map(|e| e.id).collect();
        tokio::select! {
            _ = wait_for_completion(jobs.as_ref(), &submitted) => {
                info!(executions = submitted.len(), "All executions finished");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted before all executions finished");
            }
        }
    }

    worker_handle.shutdown().await?;
    worker_task.await.context("job worker panicked")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

async fn wait_for_completion(jobs: &dyn JobRuntime, executions: &[ExecutionId]) {
    loop {
        let finished = executions.iter().all(|id| {
            jobs.completion_info(*id)
                .map_or(true, |info| info.finished)
        });
        if finished {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

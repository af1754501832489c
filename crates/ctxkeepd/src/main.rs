//! ctxkeepd - maintenance daemon for ctxkeep
//!
//! Keeps persisted memory tiers and access predictions current by running
//! bounded maintenance cycles on a fixed interval:
//!
//! - recalculate memory tiers across all projects
//! - prune expired snapshots (unless disabled)
//! - refresh stale predictions for the configured projects
//!
//! The store connection is taken from the `SURREALDB_*` environment.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};

use ctxkeep_core::metrics::METRICS;
use ctxkeep_core::telemetry::{init_tracing, LogFormat};
use ctxkeep_core::ContextKeeper;
use ctxkeep_state::SurrealSnapshotStore;

use config::{DaemonConfig, MaintenanceConfig};

#[derive(Parser)]
#[command(name = "ctxkeepd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Maintenance daemon for ctxkeep snapshot stores", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "CTXKEEP_CONFIG", default_value = "ctxkeep.toml")]
    config: PathBuf,

    /// Run a single maintenance cycle and exit
    #[arg(long)]
    once: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(format, level);

    let config = DaemonConfig::load(&cli.config)?;
    let store = SurrealSnapshotStore::from_env()
        .await
        .context("failed to connect snapshot store")?;
    let keeper = ContextKeeper::new(Arc::new(store), config.keeper.clone());

    info!(
        version = ctxkeep_core::VERSION,
        interval_secs = config.maintenance.interval_secs,
        projects = config.maintenance.projects.len(),
        "ctxkeepd started"
    );

    if cli.once {
        run_cycle(&keeper, &config.maintenance).await?;
        METRICS.flush();
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.maintenance.interval_secs));
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed cycle is retried on the next tick.
                if let Err(e) = run_cycle(&keeper, &config.maintenance).await {
                    error!(error = %e, "maintenance cycle failed");
                }
                METRICS.flush();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    METRICS.flush();
    Ok(())
}

async fn run_cycle(keeper: &ContextKeeper, maintenance: &MaintenanceConfig) -> Result<()> {
    let report = keeper
        .run_maintenance(&maintenance.projects, maintenance.prune_enabled)
        .await?;
    info!(
        tiers_changed = report.tiers_changed,
        pruned = report.pruned,
        predictions_updated = report.total_predictions_updated(),
        "maintenance cycle complete"
    );
    Ok(())
}

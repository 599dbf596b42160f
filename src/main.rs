//! Product Sorter - deterministic experiment bucketing demo
//!
//! Decides, per synthetic visitor, which product sort variation of the
//! experiment they fall into and prints an aggregate summary. With
//! `--watch` (or `datafile.auto_update`), the batch re-runs whenever the
//! experiment datafile changes.
//!
//! Module structure:
//! - `domain/` - Core types (ExperimentConfig, Decision, Datafile, AggregateReport)
//! - `services/` - Decision engine (Bucketer, Allocator, Simulation, SnapshotStore)
//! - `io/` - External interfaces (audit sink, datafile watcher)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use product_sorter::domain::ExperimentConfig;
use product_sorter::infra::{Config, Metrics};
use product_sorter::io::{create_audit_channel, AuditWriter, DatafileWatcher};
use product_sorter::services::{FileConfigSource, Simulation, SnapshotStore};
use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Product Sorter - which product sorting does each visitor get?
#[derive(Parser, Debug)]
#[command(name = "product-sorter", version, about)]
struct Args {
    /// Path to TOML configuration file
    ///
    /// Falls back to the CONFIG_FILE environment variable, then config/dev.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of visitors per run (overrides simulation.visitors)
    #[arg(short = 'n', long)]
    visitors: Option<usize>,

    /// Seed for visitor id generation (overrides simulation.seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Re-run whenever the datafile changes, until Ctrl+C
    #[arg(short, long)]
    watch: bool,

    /// Disable ANSI colors in debug markers
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug to see every bucketing decision
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "product_sorter_failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config =
        Config::load_from_path(&config_path)?.with_overrides(args.visitors, args.seed, args.watch);
    let color = !args.no_color && std::io::stdout().is_terminal();

    info!(
        git_hash = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        flag = %config.flag_key(),
        datafile = %config.datafile_path(),
        visitors = %config.visitors(),
        seed = %config.seed(),
        auto_update = %config.auto_update(),
        audit = %config.audit_enabled(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start audit writer (if enabled)
    let (audit_sender, audit_handle) = if config.audit_enabled() {
        let (sender, audit_rx) = create_audit_channel(config.audit_buffer_size());
        let writer = AuditWriter::new(config.audit_file());
        let handle = tokio::spawn(writer.run(audit_rx, shutdown_rx.clone()));
        (Some(sender), Some(handle))
    } else {
        (None, None)
    };

    // Initial snapshot - no previous snapshot to fall back on, so failures are fatal
    let source = FileConfigSource::new(config.datafile_path(), config.flag_key());
    let mut store = SnapshotStore::new();
    let initial = store.refresh(&source).with_context(|| {
        format!("Failed to load flag '{}' from {}", config.flag_key(), config.datafile_path())
    })?;
    metrics.record_snapshot_update();

    let simulation = Simulation::new(&config, metrics.clone(), audit_sender);
    run_batch(&simulation, config.visitors(), initial.snapshot(), color)?;

    if config.auto_update() {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut watcher = DatafileWatcher::new(
            source.clone(),
            Duration::from_millis(config.poll_interval_ms()),
        );
        watcher.prime();
        tokio::spawn(watcher.run(event_tx, shutdown_rx.clone()));

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        break; // Watcher stopped
                    };
                    match store.apply(event) {
                        Ok(outcome) if outcome.is_updated() => {
                            metrics.record_snapshot_update();
                            if let Err(e) = run_batch(&simulation, config.visitors(), outcome.snapshot(), color) {
                                error!(error = %format!("{:#}", e), "run_failed");
                            }
                        }
                        Ok(_) => metrics.record_snapshot_failure(),
                        Err(e) => {
                            metrics.record_snapshot_failure();
                            warn!(error = %e, "snapshot_rejected_keeping_previous");
                        }
                    }
                    metrics.report().log();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown_signal_received");
                    break;
                }
            }
        }
    }

    metrics.report().log();

    // Dropping the simulation releases the audit sender so the writer can finish
    drop(simulation);
    let _ = shutdown_tx.send(true);
    if let Some(handle) = audit_handle {
        let _ = handle.await;
    }

    info!("product-sorter shutdown complete");
    Ok(())
}

/// Run one batch and print the report to stdout
fn run_batch(
    simulation: &Simulation,
    visitors: usize,
    experiment: &ExperimentConfig,
    color: bool,
) -> anyhow::Result<()> {
    let report = simulation
        .run(visitors, experiment)
        .with_context(|| format!("Run failed for flag '{}'", experiment.key))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in report.render_console(color) {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;

    Ok(())
}

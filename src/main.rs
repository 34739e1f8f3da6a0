//! Wrap Cycle Bot - Entry Point
//!
//! Loads configuration, initializes logging, wires the chain adapters
//! and runs the wrap/unwrap schedule until it completes, halts, or
//! SIGINT arrives.
//!
//! Wiring sequence:
//! 1. Parse CLI args, load config.toml + validate
//! 2. Init tracing (JSON or plain, RUST_LOG overrides config)
//! 3. Load the signing key from the configured env var
//! 4. Build the endpoint pool, RPC connector and failover client
//! 5. Validate chain id and contract code on the active endpoint
//! 6. Spawn the metrics server on :9090 (/metrics, /live, /ready)
//! 7. Run the schedule; SIGINT cancels it
//! 8. Exit 0 if every iteration ran, 1 otherwise

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wrap_cycle_bot::adapters::chain::{LocalSigner, RpcConnector, validate_network};
use wrap_cycle_bot::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use wrap_cycle_bot::adapters::persistence::{JsonlJournal, NullJournal};
use wrap_cycle_bot::config::{self, AppConfig};
use wrap_cycle_bot::domain::{Endpoint, EndpointPool};
use wrap_cycle_bot::ports::{Journal, NoopTelemetry, Telemetry, TxSigner};
use wrap_cycle_bot::usecases::{Failover, ScheduleOutcome, WrapCycle};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "WRAP_CYCLE_CONFIG")]
    config: PathBuf,

    /// Skip the startup chain id / contract check
    #[arg(long)]
    skip_validation: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // ── 1. Load configuration ────────────────────────────────
    let config = config::loader::load_config(&args.config)
        .context("Failed to load configuration")?;

    // ── 2. Initialize logging ────────────────────────────────
    init_tracing(&config);

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        chain_id = config.network.chain_id,
        endpoints = config.network.endpoints.len(),
        iterations = config.schedule.iterations,
        "Starting wrap cycle bot"
    );

    // ── 3. Signing key ───────────────────────────────────────
    let signer = Arc::new(
        LocalSigner::from_env(&config.wallet.private_key_env)
            .context("Failed to load signing key")?,
    );
    info!(address = %signer.address(), "Wallet loaded");

    // ── 4. Endpoint pool + failover client ───────────────────
    let pool = EndpointPool::new(
        config
            .network
            .endpoints
            .iter()
            .map(|url| Endpoint::new(url.as_str()))
            .collect(),
    )?;
    let connector = RpcConnector::new(config.network.request_timeout())?;

    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new().context("Failed to create metrics")?))
    } else {
        None
    };
    let telemetry: Arc<dyn Telemetry> = match &metrics {
        Some(registry) => Arc::clone(registry) as Arc<dyn Telemetry>,
        None => Arc::new(NoopTelemetry),
    };

    let failover = Arc::new(
        Failover::new(pool, connector)
            .context("Failed to connect to first endpoint")?
            .with_telemetry(Arc::clone(&telemetry)),
    );

    // ── 5. Startup validation ────────────────────────────────
    if config.network.validate_on_startup && !args.skip_validation {
        let wrapped_native = config
            .contracts
            .wrapped_native
            .parse()
            .context("Invalid wrapped_native address")?;
        let report = validate_network(&failover.client(), config.network.chain_id, wrapped_native)
            .await
            .context("Startup validation failed")?;
        info!(
            endpoint = %report.endpoint,
            chain_id = report.chain_id,
            code_size = report.code_size,
            "Startup validation passed"
        );
    } else {
        warn!("Startup validation skipped");
    }

    // ── 6. Metrics server ────────────────────────────────────
    let cancel = CancellationToken::new();
    let health = Arc::new(HealthState::new());
    let metrics_handle = metrics.map(|registry| {
        let server = HealthServer::new(
            Arc::clone(&health),
            registry,
            config.metrics.bind_address.clone(),
        );
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    // ── 7. Run the schedule ──────────────────────────────────
    let journal = build_journal(&config).await?;
    let cycle = WrapCycle::new(
        &config,
        Arc::clone(&failover),
        signer,
        journal,
        telemetry,
        cancel.clone(),
    )?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, cancelling schedule");
            interrupt.cancel();
        }
    });

    let report = cycle.run().await;
    health.set_running(false);

    match &report.outcome {
        ScheduleOutcome::Completed => {
            info!(completed = report.completed, skipped = report.skipped, "Schedule completed");
        }
        ScheduleOutcome::Halted(reason) => {
            error!(
                completed = report.completed,
                skipped = report.skipped,
                reason = %reason,
                "Schedule aborted"
            );
        }
    }

    // ── 8. Shutdown ──────────────────────────────────────────
    cancel.cancel();
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(ExitCode::from(report.exit_code()))
}

/// JSON or plain formatted logs; `RUST_LOG` wins over `bot.log_level`.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.bot.log_level));

    if config.bot.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn build_journal(config: &AppConfig) -> Result<Arc<dyn Journal>> {
    if config.persistence.enabled {
        let journal = JsonlJournal::new(&config.persistence.data_dir)
            .await
            .context("Failed to open transaction journal")?;
        info!(file = %journal.current_file().display(), "Journal enabled");
        Ok(Arc::new(journal))
    } else {
        Ok(Arc::new(NullJournal))
    }
}

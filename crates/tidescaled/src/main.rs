//! tidescaled — the tidescale daemon.
//!
//! Loads a TOML workload inventory, evaluates every workload on a fixed
//! interval and applies the resulting replica counts to the inventory.
//!
//! # Usage
//!
//! ```text
//! tidescaled init --config tidescale.toml
//! tidescaled validate --config tidescale.toml
//! tidescaled run --config tidescale.toml [--once]
//! ```

mod daemon;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use tidescale_core::DaemonConfig;

use crate::daemon::{decision_json, engine_config, ensure_valid, Daemon};

#[derive(Parser)]
#[command(name = "tidescaled", about = "tidescale autoscaling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate rounds on the configured interval until Ctrl-C.
    Run {
        /// Path to the daemon configuration file.
        #[arg(long, short, default_value = "tidescale.toml")]
        config: PathBuf,

        /// Run a single round and print decisions as JSON lines.
        #[arg(long)]
        once: bool,
    },
    /// Check the configuration and exit.
    Validate {
        #[arg(long, short, default_value = "tidescale.toml")]
        config: PathBuf,
    },
    /// Write a starter configuration file.
    Init {
        #[arg(long, short, default_value = "tidescale.toml")]
        config: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tidescale=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, once } => run(config, once).await,
        Command::Validate { config } => validate(config),
        Command::Init { config, force } => init(config, force),
    }
}

async fn run(path: PathBuf, once: bool) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    let mut daemon = Daemon::new(&config)?;
    info!(path = %path.display(), "configuration loaded");

    if once {
        let report = daemon.round().await;
        for decision in &report.decisions {
            println!("{}", decision_json(decision));
        }
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    daemon.run(shutdown_rx).await;
    info!("tidescaled stopped");
    Ok(())
}

fn validate(path: PathBuf) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    config.interval()?;
    let engine = engine_config(&config)?;
    ensure_valid(&engine)?;
    info!(
        path = %path.display(),
        strategies = engine.strategies().len(),
        providers = engine.providers().len(),
        workloads = config.workloads.len(),
        "configuration is valid"
    );
    Ok(())
}

fn init(path: PathBuf, force: bool) -> anyhow::Result<()> {
    anyhow::ensure!(
        force || !path.exists(),
        "{} already exists (use --force to overwrite)",
        path.display()
    );
    let content = DaemonConfig::scaffold().to_toml_string()?;
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "configuration written");
    Ok(())
}

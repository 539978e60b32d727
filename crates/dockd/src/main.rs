//! dockd: the dockgrid daemon.
//!
//! Single binary around the dockgrid libraries:
//! - State store (redb)
//! - Scheduler + placement preview
//! - Deployer with a dry-run executor
//!
//! # Usage
//!
//! ```text
//! dockd --data-dir /var/lib/dockgrid import seed.json
//! dockd plan prod/web
//! dockd --config /etc/dockgrid/dockd.toml deploy prod/web
//! ```

mod config;
mod dry_run;
mod import;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dockgrid_rollout::{DeployOutcome, Deployer};
use dockgrid_scheduler::{Scheduler, candidate_nodes};
use dockgrid_state::StateStore;

use crate::config::DockdConfig;
use crate::dry_run::DryRunExecutor;
use crate::import::SeedManifest;

#[derive(Parser)]
#[command(name = "dockd", about = "dockgrid daemon")]
struct Cli {
    /// Path to dockd.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state; overrides the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed nodes, services and registry credentials from a JSON manifest.
    Import {
        /// Manifest file.
        file: PathBuf,
    },
    /// Print where each instance of a service would be placed.
    Plan {
        /// Service id, `{grid}/{name}`.
        service: String,
    },
    /// Deploy a service with the dry-run executor.
    Deploy {
        /// Service id, `{grid}/{name}`.
        service: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dockd=debug,dockgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DockdConfig::load(cli.config.as_deref())
        .context("failed to load dockd config")?;
    if let Some(data_dir) = cli.data_dir {
        config.state.data_dir = data_dir;
    }

    std::fs::create_dir_all(&config.state.data_dir)?;
    let db_path = config.db_path();
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    match cli.command {
        Command::Import { file } => run_import(&state, file),
        Command::Plan { service } => run_plan(&state, &service),
        Command::Deploy { service } => run_deploy(state, config, &service).await,
    }
}

fn run_import(state: &StateStore, file: PathBuf) -> anyhow::Result<()> {
    let manifest = SeedManifest::from_file(&file)
        .with_context(|| format!("failed to read manifest {}", file.display()))?;
    let summary = import::import(state, manifest)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_plan(state: &StateStore, service_id: &str) -> anyhow::Result<()> {
    let plan = dockgrid_scheduler::preview(state, service_id)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run_deploy(state: StateStore, config: DockdConfig, service_id: &str) -> anyhow::Result<()> {
    let service = state
        .get_service(service_id)?
        .with_context(|| format!("service {service_id} not found"))?;
    let nodes = candidate_nodes(&state, &service)?;

    let executor = Arc::new(DryRunExecutor::new(state.clone()));
    let deployer = Deployer::new(
        Scheduler::for_service(&service),
        state,
        executor,
        config.deployer,
    );

    // ── Shutdown signal ────────────────────────────────────────

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling deploy");
            on_signal.cancel();
        }
    });

    let outcome = deployer.deploy_report(&service, &nodes, &cancel).await;
    signal_handle.abort();

    match outcome {
        DeployOutcome::Deployed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        DeployOutcome::AlreadyDeploying => {
            anyhow::bail!("service {service_id} is already being deployed")
        }
        DeployOutcome::Failed(err) => {
            Err(anyhow::Error::new(err).context(format!("deploy of {service_id} failed")))
        }
    }
}

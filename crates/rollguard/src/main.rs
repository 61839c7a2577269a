//! rollguard — self-healing deployment reconciler.
//!
//! Records rollouts, watches them become healthy, retries failed ones and
//! rolls back to the previous version when retries run out.
//!
//! # Usage
//!
//! ```text
//! rollguard submit --id deploy-42 --namespace prod --app api --version v7
//! rollguard reconcile deploy-42 deploy-43
//! rollguard status deploy-42
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

mod commands;
mod config;

use config::RollguardConfig;

#[derive(Parser)]
#[command(
    name = "rollguard",
    about = "Rollguard — self-healing deployment reconciler",
    version
)]
struct Cli {
    /// Config file. `rollguard.toml` is used when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new rollout as pending.
    Submit {
        /// Unique deployment id.
        #[arg(long)]
        id: String,
        #[arg(long)]
        namespace: String,
        /// Kubernetes deployment name.
        #[arg(long)]
        app: String,
        /// Version being rolled out.
        #[arg(long)]
        version: String,
        /// Caller context as `key=value`; values that parse as JSON are kept as JSON.
        #[arg(long = "meta", value_parser = commands::submit::parse_meta)]
        meta: Vec<(String, serde_json::Value)>,
    },
    /// Drive rollouts until they settle. Ctrl-C stops without touching state.
    Reconcile {
        /// Deployment ids, reconciled concurrently.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print a deployment record as JSON.
    Status { id: String },
    /// Remove expired records.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rollguard=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = RollguardConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            id,
            namespace,
            app,
            version,
            meta,
        } => {
            let request = commands::submit::request(id, namespace, app, version, meta);
            commands::submit::submit(&config.reconciler()?, request)
        }
        Command::Reconcile { ids } => {
            let reconciler = config
                .reconciler()?
                .with_redeploy(commands::reconcile::log_redeploy());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
            });
            commands::reconcile::reconcile(&reconciler, ids, shutdown_rx).await
        }
        Command::Status { id } => commands::status::status(&config.open_store()?, &id),
        Command::Purge => commands::status::purge(&config.open_store()?),
    }
}

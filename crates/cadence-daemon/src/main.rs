use std::sync::Arc;

use anyhow::Context;
use cadence_core::CadenceConfig;
use cadence_runner::{CommandRunner, RunOptions};
use cadence_scheduler::Scheduler;
use cadence_store::{JobStore, SqliteJobStore};
use clap::{Parser, Subcommand};
use tracing::info;

mod jobs;

#[derive(Debug, Parser)]
#[command(name = "cadence")]
#[command(about = "Cron-style job scheduler with concurrent command fan-out")]
struct Cli {
    /// Config file (defaults to $CADENCE_CONFIG, then ~/.cadence/cadence.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load enabled jobs and run the scheduler until Ctrl-C
    Serve,
    /// Manage stored jobs
    Jobs {
        #[command(subcommand)]
        command: jobs::JobsCommands,
    },
    /// Run a job once right now and wait for its execution to finish
    Run {
        /// Job id
        id: String,
    },
    /// Show recent executions, newest first
    Executions {
        /// Only executions of this job
        #[arg(long)]
        job: Option<String>,
        /// Maximum number of executions to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence=info,cadence_scheduler=info,cadence_store=info,cadence_runner=warn".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit flag > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config_path = cli.config.or_else(|| std::env::var("CADENCE_CONFIG").ok());
    let config = CadenceConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = SqliteJobStore::open(db_path)
        .with_context(|| format!("cannot open job store at {db_path}"))?;
    let store: Arc<dyn JobStore> = Arc::new(store);

    match cli.command {
        Commands::Serve => serve(&config, store).await,
        Commands::Jobs { command } => jobs::run(command, store.as_ref()).await,
        Commands::Run { id } => jobs::run_now(&config, store, &id).await,
        Commands::Executions { job, limit } => {
            jobs::list_executions(store.as_ref(), job.as_deref(), limit).await
        }
    }
}

async fn serve(config: &CadenceConfig, store: Arc<dyn JobStore>) -> anyhow::Result<()> {
    let scheduler = build_scheduler(config, store);
    let registered = scheduler.load_and_start().await?;
    info!(registered, "cadence serving; press Ctrl-C to stop");

    shutdown_signal().await;
    info!("shutdown requested");
    scheduler.stop().await;
    Ok(())
}

pub(crate) fn build_scheduler(config: &CadenceConfig, store: Arc<dyn JobStore>) -> Scheduler {
    let runner = CommandRunner::new(RunOptions::from(&config.runner));
    Scheduler::new(store, &config.scheduler, runner)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

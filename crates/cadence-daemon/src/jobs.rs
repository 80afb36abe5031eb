//! Job and execution management commands.
//!
//! These act on the store directly. A running `cadence serve` only picks up
//! changes made here when it is restarted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use cadence_core::{CadenceConfig, Execution, Job, NewJob};
use cadence_scheduler::CronSchedule;
use cadence_store::JobStore;
use chrono::{DateTime, Utc};
use clap::Subcommand;

/// How often `run` checks whether the execution has finished.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Sub-commands available under `jobs`.
#[derive(Debug, Subcommand)]
pub enum JobsCommands {
    /// Create a job
    Add {
        /// Display name
        #[arg(long)]
        name: String,
        /// Cron expression, 5 fields (min hour dom month dow) or 6 with seconds
        #[arg(long)]
        schedule: Option<String>,
        /// One-time run instant, RFC 3339 (e.g. 2026-01-01T09:00:00Z)
        #[arg(long)]
        run_at: Option<String>,
        /// Shell command; repeat for several commands run concurrently
        #[arg(long = "command", required = true)]
        commands: Vec<String>,
        /// Store the job disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List all jobs
    List,
    /// Enable a job
    Enable { id: String },
    /// Disable a job
    Disable { id: String },
    /// Delete a job and its executions
    Remove { id: String },
}

pub async fn run(command: JobsCommands, store: &dyn JobStore) -> anyhow::Result<()> {
    match command {
        JobsCommands::Add {
            name,
            schedule,
            run_at,
            commands,
            disabled,
        } => {
            let run_at = run_at.as_deref().map(parse_instant).transpose()?;
            let new = NewJob {
                name,
                commands,
                schedule,
                run_at,
                enabled: !disabled,
            };
            new.validate(Utc::now())?;
            if let Some(expr) = new.schedule.as_deref().filter(|s| !s.trim().is_empty()) {
                CronSchedule::parse(expr)?;
            }
            let job = store.create_job(&new).await?;
            println!("created job {}", job.id);
        }
        JobsCommands::List => {
            let jobs = store.list_jobs().await?;
            if jobs.is_empty() {
                println!("no jobs");
            }
            let now = Utc::now();
            for job in jobs {
                println!(
                    "{}  {:<8}  {:<40}  {}",
                    job.id,
                    if job.enabled { "enabled" } else { "disabled" },
                    job.trigger(now).to_string(),
                    job.name
                );
            }
        }
        JobsCommands::Enable { id } => set_enabled(store, &id, true).await?,
        JobsCommands::Disable { id } => set_enabled(store, &id, false).await?,
        JobsCommands::Remove { id } => {
            store.delete_job(&id).await?;
            println!("removed job {id}");
        }
    }
    Ok(())
}

async fn set_enabled(store: &dyn JobStore, id: &str, enabled: bool) -> anyhow::Result<()> {
    let mut job = store.get_job(id).await?;
    job.enabled = enabled;
    store.save_job(&job).await?;
    println!(
        "job {id} {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Run one job through a short-lived scheduler and print the result.
pub async fn run_now(
    config: &CadenceConfig,
    store: Arc<dyn JobStore>,
    id: &str,
) -> anyhow::Result<()> {
    let job: Job = store.get_job(id).await?;
    let scheduler = crate::build_scheduler(config, Arc::clone(&store));

    let started = scheduler.run_job_now(&job).await?;
    let finished = loop {
        let execution = store
            .get_execution(&started.id)
            .await
            .context("lost track of execution")?;
        if execution.is_finished() {
            break execution;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    scheduler.stop().await;

    println!("{}", finished.output);
    print_execution(&finished);
    if !finished.success {
        bail!("execution {} failed", finished.id);
    }
    Ok(())
}

pub async fn list_executions(
    store: &dyn JobStore,
    job_id: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let executions = store.list_executions(job_id, limit).await?;
    if executions.is_empty() {
        println!("no executions");
    }
    for execution in &executions {
        print_execution(execution);
    }
    Ok(())
}

fn print_execution(execution: &Execution) {
    let status = match (execution.finished_at, execution.success) {
        (None, _) => "running",
        (Some(_), true) => "ok",
        (Some(_), false) => "failed",
    };
    println!(
        "{}  job={}  started={}  {}",
        execution.id,
        execution.job_id,
        execution.started_at.to_rfc3339(),
        status
    );
}

fn parse_instant(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid --run-at `{raw}`, expected RFC 3339"))?;
    Ok(at.with_timezone(&Utc))
}

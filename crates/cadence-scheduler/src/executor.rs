use async_trait::async_trait;
use cadence_core::Execution;
use cadence_runner::{CommandOutcome, CommandRunner};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::{
    pool::{JobHandler, WorkItem},
    recorder::ExecutionRecorder,
};

/// Aggregate result of one fan-out.
#[derive(Debug, Clone)]
pub struct FanoutReport {
    /// One outcome per command, in command order.
    pub outcomes: Vec<CommandOutcome>,
    /// Outcomes' output joined with newlines, in command order.
    pub output: String,
    /// True only if every command succeeded.
    pub success: bool,
    pub finished_at: DateTime<Utc>,
}

impl FanoutReport {
    fn from_outcomes(outcomes: Vec<CommandOutcome>) -> Self {
        let success = !outcomes.is_empty() && outcomes.iter().all(|o| o.success);
        let output = if outcomes.is_empty() {
            "Error: no commands to run".to_string()
        } else {
            outcomes
                .iter()
                .map(|o| o.output.trim_end_matches('\n'))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self {
            outcomes,
            output,
            success,
            finished_at: Utc::now(),
        }
    }
}

/// Runs every command of a job concurrently and records the result.
///
/// Failure is independent per command: a failing or timed-out command never
/// cancels its siblings.
pub struct FanoutExecutor {
    runner: CommandRunner,
    recorder: ExecutionRecorder,
}

impl FanoutExecutor {
    pub fn new(runner: CommandRunner, recorder: ExecutionRecorder) -> Self {
        Self { runner, recorder }
    }

    /// Run `commands` concurrently, one task each, and wait for all of them.
    ///
    /// Results are collected by position, so report order is command order
    /// regardless of completion order.
    pub async fn run_commands(&self, commands: &[String]) -> FanoutReport {
        let tasks = commands.iter().map(|command| {
            let runner = self.runner.clone();
            let command = command.clone();
            tokio::spawn(async move { runner.run(&command).await })
        });

        let outcomes = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "command task failed");
                    CommandOutcome::failed("", &format!("command task failed: {e}"))
                }
            })
            .collect();

        FanoutReport::from_outcomes(outcomes)
    }

    /// Execute one queued run end to end.
    ///
    /// Creates the execution row first (unless the item carries one), fans
    /// out, then writes the execution result and the job's `last_run_at`.
    /// Store failures are logged and end the run; nothing is retried.
    /// Returns the finished execution when it was recorded.
    pub async fn execute(&self, item: WorkItem) -> Option<Execution> {
        let WorkItem { job, execution } = item;

        let execution = match execution {
            Some(execution) => execution,
            None => match self.recorder.begin(&job.id).await {
                Ok(execution) => execution,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "could not record execution start; run skipped");
                    return None;
                }
            },
        };

        let commands = job.command_list();
        info!(
            job_id = %job.id,
            execution_id = %execution.id,
            commands = commands.len(),
            "execution started"
        );

        let report = self.run_commands(&commands).await;

        let execution = match self.recorder.finish(execution, &report).await {
            Ok(execution) => execution,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "could not record execution result");
                return None;
            }
        };

        match self.recorder.mark_job_run(&job.id, report.finished_at).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(job_id = %job.id, "job deleted during run; last_run_at not updated");
            }
            Err(e) => warn!(job_id = %job.id, error = %e, "could not update last_run_at"),
        }

        if report.success {
            info!(job_id = %job.id, execution_id = %execution.id, "execution succeeded");
        } else {
            let failed = report.outcomes.iter().filter(|o| !o.success).count();
            warn!(
                job_id = %job.id,
                execution_id = %execution.id,
                failed,
                "execution failed"
            );
        }
        Some(execution)
    }
}

#[async_trait]
impl JobHandler for FanoutExecutor {
    async fn handle(&self, item: WorkItem) {
        self.execute(item).await;
    }
}

use std::sync::Arc;

use cadence_core::Execution;
use cadence_store::{JobStore, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::executor::FanoutReport;

/// Maps run lifecycle events onto execution and job rows.
#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn JobStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist a new, unfinished execution for `job_id` started now.
    pub async fn begin(&self, job_id: &str) -> Result<Execution> {
        let mut execution = Execution::started(job_id, Utc::now());
        execution.id = self.store.create_execution(&execution).await?;
        debug!(job_id, execution_id = %execution.id, "execution recorded as started");
        Ok(execution)
    }

    /// Write the fan-out result into `execution`. Called once per execution.
    pub async fn finish(&self, mut execution: Execution, report: &FanoutReport) -> Result<Execution> {
        execution.finished_at = Some(report.finished_at);
        execution.success = report.success;
        execution.output = report.output.clone();
        self.store.save_execution(&execution).await?;
        Ok(execution)
    }

    /// Close out an execution that will never run.
    pub async fn abandon(&self, mut execution: Execution, reason: &str) -> Result<Execution> {
        execution.finished_at = Some(Utc::now());
        execution.success = false;
        execution.output = format!("Error: {reason}");
        self.store.save_execution(&execution).await?;
        Ok(execution)
    }

    /// Stamp `last_run_at` on the job's current row.
    ///
    /// Reloads first so concurrent edits to other fields are not overwritten
    /// with a stale snapshot.
    pub async fn mark_job_run(&self, job_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut job = self.store.get_job(job_id).await?;
        job.last_run_at = Some(at);
        self.store.save_job(&job).await
    }
}

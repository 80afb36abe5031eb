use async_trait::async_trait;
use cadence_core::{Execution, Job, NewJob};

use crate::error::Result;

/// Durable home of jobs and their executions.
///
/// The scheduler only needs the first six methods; the rest serve management
/// surfaces (CLI, API layer). Every write touches a single row.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs with `enabled = true`, oldest first.
    async fn find_enabled_jobs(&self) -> Result<Vec<Job>>;

    /// Load one job. Unknown ids yield [`crate::StoreError::JobNotFound`].
    async fn get_job(&self, id: &str) -> Result<Job>;

    /// Overwrite a job row; bumps `updated_at`.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Insert an execution and return its new id. `exec.id` is ignored.
    async fn create_execution(&self, exec: &Execution) -> Result<String>;

    async fn get_execution(&self, id: &str) -> Result<Execution>;

    /// Overwrite an execution row.
    async fn save_execution(&self, exec: &Execution) -> Result<()>;

    /// Insert a job, assigning its id and audit timestamps.
    async fn create_job(&self, new: &NewJob) -> Result<Job>;

    async fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Delete a job and, by cascade, its executions.
    async fn delete_job(&self, id: &str) -> Result<()>;

    /// Most recent executions first, optionally for a single job.
    async fn list_executions(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<Execution>>;
}

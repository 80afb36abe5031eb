use cadence_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schedule expression could not be parsed; the job stays unregistered.
    #[error("Invalid schedule `{expression}`: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The job has no non-blank command to run.
    #[error("Job {job_id} has no commands")]
    MissingCommand { job_id: String },

    /// Reading or writing the job store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The worker queue was full and the run was dropped.
    #[error("Worker queue full; run of job {job_id} dropped")]
    QueueFull { job_id: String },

    /// The scheduler has been stopped and accepts no new registrations.
    #[error("Scheduler is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

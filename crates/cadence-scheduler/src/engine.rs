use std::sync::Arc;

use cadence_core::{config::SchedulerConfig, Execution, Job};
use cadence_runner::CommandRunner;
use cadence_store::JobStore;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::{
    error::{Result, SchedulerError},
    executor::FanoutExecutor,
    pool::{Rejected, WorkItem, WorkerPool},
    recorder::ExecutionRecorder,
    registry::{HandleKind, ScheduleRegistry},
    trigger::TriggerEngine,
};

const QUEUE_FULL_REASON: &str = "worker queue full; run dropped";
const STOPPED_REASON: &str = "scheduler stopped; run dropped";

/// The surface the API layer talks to.
///
/// Owns the registry, the worker pool and the recurring clock. Must be
/// created inside a Tokio runtime because workers start immediately.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    registry: Arc<ScheduleRegistry>,
    pool: WorkerPool,
    recorder: ExecutionRecorder,
    clock: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, config: &SchedulerConfig, runner: CommandRunner) -> Self {
        let recorder = ExecutionRecorder::new(Arc::clone(&store));
        let executor = Arc::new(FanoutExecutor::new(runner, recorder.clone()));
        let pool = WorkerPool::start(config.workers, config.queue_capacity, executor);

        let (clock, clock_rx) = watch::channel(false);
        let engine = TriggerEngine::new(Arc::clone(&store), pool.dispatcher(), clock_rx);

        Self {
            store,
            registry: ScheduleRegistry::new(engine),
            pool,
            recorder,
            clock,
        }
    }

    /// Register every enabled job, then start the recurring clock.
    ///
    /// A job that fails to register is logged and skipped. Only failing to
    /// read the job list at all is an error. Returns the number of jobs that
    /// ended up with a handle.
    pub async fn load_and_start(&self) -> Result<usize> {
        let jobs = self.store.find_enabled_jobs().await?;
        let total = jobs.len();

        let mut registered = 0;
        for job in &jobs {
            match self.registry.register(job).await {
                Ok(Some(_)) => registered += 1,
                Ok(None) => {}
                Err(e) => warn!(job_id = %job.id, error = %e, "job skipped at startup"),
            }
        }

        self.clock.send_replace(true);
        info!(total, registered, "scheduler started");
        Ok(registered)
    }

    /// Create, update, reschedule and toggle all go through here.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn schedule_job(&self, job: &Job) -> Result<Option<HandleKind>> {
        self.registry.register(job).await
    }

    /// Drop the job's trigger. Safe to call for jobs without one.
    pub async fn remove(&self, job_id: &str) -> bool {
        self.registry.deregister(job_id).await
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.registry.is_registered(job_id).await
    }

    pub async fn describe(&self, job_id: &str) -> Option<HandleKind> {
        self.registry.describe(job_id).await
    }

    /// Queue a manual run, ignoring `enabled` and any schedule.
    ///
    /// The returned execution is still in progress. A stopped scheduler
    /// returns `Stopped` without recording anything. When the queue is full
    /// the execution is closed out as failed and `QueueFull` is returned.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn run_job_now(&self, job: &Job) -> Result<Execution> {
        if self.pool.is_stopped() {
            return Err(SchedulerError::Stopped);
        }

        let execution = self.recorder.begin(&job.id).await?;
        let (reason, err) = match self
            .pool
            .submit(WorkItem::manual(job.clone(), execution.clone()))
        {
            Ok(()) => {
                info!(execution_id = %execution.id, "manual run queued");
                return Ok(execution);
            }
            Err(Rejected::Full) => (
                QUEUE_FULL_REASON,
                SchedulerError::QueueFull {
                    job_id: job.id.clone(),
                },
            ),
            Err(Rejected::Stopped) => (STOPPED_REASON, SchedulerError::Stopped),
        };

        self.close_out(execution, reason).await;
        Err(err)
    }

    /// Cancel every trigger, then wait for in-flight executions to finish.
    ///
    /// Queued runs that no worker picked up are dropped; manual ones have
    /// their execution closed out as failed.
    pub async fn stop(&self) {
        self.clock.send_replace(false);
        let cancelled = self.registry.close().await;
        info!(cancelled, "triggers cancelled; draining workers");

        let leftover = self.pool.shutdown().await;
        let dropped = leftover.len();
        for item in leftover {
            if let Some(execution) = item.execution {
                self.close_out(execution, STOPPED_REASON).await;
            }
        }
        info!(dropped, "scheduler stopped");
    }

    async fn close_out(&self, execution: Execution, reason: &str) {
        let execution_id = execution.id.clone();
        if let Err(e) = self.recorder.abandon(execution, reason).await {
            error!(%execution_id, error = %e, "could not close out dropped manual run");
        }
    }
}

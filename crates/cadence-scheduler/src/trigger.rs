use std::sync::Arc;

use cadence_core::Job;
use cadence_store::JobStore;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    pool::{Dispatcher, WorkItem},
    schedule::{sleep_until, CronSchedule},
};

/// Turns due triggers into queued work.
///
/// Holds no per-job state: every fire looks the job up again by id, so the
/// worker always sees the current command list and enabled flag.
#[derive(Clone)]
pub(crate) struct TriggerEngine {
    store: Arc<dyn JobStore>,
    dispatcher: Dispatcher,
    /// Recurring loops idle until this flips to `true`.
    clock: watch::Receiver<bool>,
}

impl TriggerEngine {
    pub(crate) fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Dispatcher,
        clock: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
        }
    }

    /// Spawn the re-arming loop for a recurring job. Aborting the returned
    /// handle is how the registry cancels it.
    pub(crate) fn arm_recurring(&self, job_id: String, schedule: CronSchedule) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.recurring_loop(job_id, schedule).await })
    }

    async fn recurring_loop(mut self, job_id: String, schedule: CronSchedule) {
        if self.clock.wait_for(|running| *running).await.is_err() {
            debug!(job_id = %job_id, "scheduler dropped before clock start");
            return;
        }

        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            // Never earlier than the previous fire, so one instant fires once
            // even if the wall clock steps backwards.
            let from = match last_fire {
                Some(prev) => prev.max(Utc::now()),
                None => Utc::now(),
            };
            let Some(next) = schedule.next_after(from) else {
                info!(
                    job_id = %job_id,
                    schedule = schedule.expression(),
                    "schedule has no further fire times"
                );
                return;
            };
            debug!(job_id = %job_id, next = %next.to_rfc3339(), "next recurring fire");
            sleep_until(next).await;
            last_fire = Some(next);
            self.fire(&job_id).await;
        }
    }

    /// Reload the job and queue it if it is still enabled.
    pub(crate) async fn fire(&self, job_id: &str) {
        let job = match self.store.get_job(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                info!(job_id, "job no longer exists; fire skipped");
                return;
            }
            Err(e) => {
                warn!(job_id, error = %e, "could not reload job; fire skipped");
                return;
            }
        };
        if !job.enabled {
            info!(job_id, "job disabled; fire skipped");
            return;
        }
        self.dispatch(job);
    }

    /// Reload a one-time job and persist `enabled = false` before it is queued.
    ///
    /// Returns the job to dispatch, or `None` when the fire must be skipped.
    /// Called by the registry with its table lock held.
    pub(crate) async fn claim_one_time(&self, job_id: &str) -> Option<Job> {
        let mut job = match self.store.get_job(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                info!(job_id, "job no longer exists; one-time fire skipped");
                return None;
            }
            Err(e) => {
                warn!(job_id, error = %e, "could not reload job; one-time fire skipped");
                return None;
            }
        };
        if !job.enabled {
            info!(job_id, "job disabled; one-time fire skipped");
            return None;
        }

        job.enabled = false;
        if let Err(e) = self.store.save_job(&job).await {
            // Firing without the disable persisted could run it again after a reload.
            warn!(job_id, error = %e, "could not disable one-time job; fire skipped");
            return None;
        }
        Some(job)
    }

    /// Queue a triggered run. A rejection is already logged by the dispatcher.
    pub(crate) fn dispatch(&self, job: Job) {
        let job_id = job.id.clone();
        if self.dispatcher.submit(WorkItem::triggered(job)).is_ok() {
            debug!(job_id = %job_id, "job queued");
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cadence_core::{Job, Trigger};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    schedule::{sleep_until, CronSchedule},
    trigger::TriggerEngine,
};

/// What an active handle will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleKind {
    Recurring { expression: String },
    OneTime { at: DateTime<Utc> },
}

impl From<&HandleKind> for Trigger {
    fn from(kind: &HandleKind) -> Self {
        match kind {
            HandleKind::Recurring { expression } => Trigger::Recurring(expression.clone()),
            HandleKind::OneTime { at } => Trigger::OneTime(*at),
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Trigger::from(self), f)
    }
}

struct Handle {
    kind: HandleKind,
    /// Lets a one-time timer tell whether it is still the live handle.
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Table {
    handles: HashMap<String, Handle>,
    closed: bool,
}

/// In-memory index of job id to active trigger handle.
///
/// Every mutation runs under one lock. The table is never handed out; callers
/// only see [`HandleKind`] snapshots.
pub struct ScheduleRegistry {
    table: Mutex<Table>,
    engine: TriggerEngine,
    generation: AtomicU64,
}

impl ScheduleRegistry {
    pub(crate) fn new(engine: TriggerEngine) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(Table::default()),
            engine,
            generation: AtomicU64::new(0),
        })
    }

    /// Install the handle `job` currently calls for, replacing any prior one.
    ///
    /// Disabled jobs and jobs with no usable trigger source end up with no
    /// handle and return `Ok(None)`. Validation errors leave the job with no
    /// handle either.
    pub async fn register(self: &Arc<Self>, job: &Job) -> Result<Option<HandleKind>> {
        let mut table = self.table.lock().await;
        if table.closed {
            return Err(SchedulerError::Stopped);
        }

        if let Some(prior) = table.handles.remove(&job.id) {
            prior.task.abort();
            debug!(job_id = %job.id, trigger = %prior.kind, "prior handle cancelled");
        }

        if !job.enabled {
            info!(job_id = %job.id, trigger = "none", "job disabled; not registered");
            return Ok(None);
        }

        let trigger = job.trigger(Utc::now());
        if trigger == Trigger::None {
            info!(job_id = %job.id, trigger = "none", "no future trigger; not registered");
            return Ok(None);
        }
        if job.command_list().is_empty() {
            return Err(SchedulerError::MissingCommand {
                job_id: job.id.clone(),
            });
        }
        // A stored schedule must parse even while a future run_at shadows it.
        let schedule = job
            .schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(CronSchedule::parse)
            .transpose()?;

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (kind, task) = match (trigger, schedule) {
            (Trigger::Recurring(expression), Some(schedule)) => {
                let task = self.engine.arm_recurring(job.id.clone(), schedule);
                (HandleKind::Recurring { expression }, task)
            }
            (Trigger::OneTime(at), _) => {
                let task = tokio::spawn(one_time_timer(
                    Arc::downgrade(self),
                    job.id.clone(),
                    at,
                    generation,
                ));
                (HandleKind::OneTime { at }, task)
            }
            _ => return Ok(None),
        };

        info!(job_id = %job.id, trigger = %kind, "job registered");
        table.handles.insert(
            job.id.clone(),
            Handle {
                kind: kind.clone(),
                generation,
                task,
            },
        );
        Ok(Some(kind))
    }

    /// Cancel the job's handle. Returns `false` when it had none.
    pub async fn deregister(&self, job_id: &str) -> bool {
        let mut table = self.table.lock().await;
        match table.handles.remove(job_id) {
            Some(handle) => {
                handle.task.abort();
                info!(job_id, trigger = %handle.kind, "job deregistered");
                true
            }
            None => {
                debug!(job_id, "deregister: no handle");
                false
            }
        }
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.table.lock().await.handles.contains_key(job_id)
    }

    pub async fn describe(&self, job_id: &str) -> Option<HandleKind> {
        self.table
            .lock()
            .await
            .handles
            .get(job_id)
            .map(|h| h.kind.clone())
    }

    pub async fn handle_count(&self) -> usize {
        self.table.lock().await.handles.len()
    }

    /// Cancel every handle and refuse further registrations.
    /// Returns how many handles were cancelled.
    pub async fn close(&self) -> usize {
        let mut table = self.table.lock().await;
        table.closed = true;
        let cancelled = table.handles.len();
        for (_, handle) in table.handles.drain() {
            handle.task.abort();
        }
        cancelled
    }

    /// One-time fire bookkeeping, atomic with respect to register/deregister.
    async fn fire_one_time(&self, job_id: &str, generation: u64) {
        let mut table = self.table.lock().await;
        match table.handles.get(job_id) {
            Some(handle) if handle.generation == generation => {}
            _ => {
                debug!(job_id, "one-time timer superseded; ignoring");
                return;
            }
        }
        table.handles.remove(job_id);

        if let Some(job) = self.engine.claim_one_time(job_id).await {
            self.engine.dispatch(job);
            info!(job_id, "one-time trigger fired; job disabled");
        }
    }
}

async fn one_time_timer(
    registry: Weak<ScheduleRegistry>,
    job_id: String,
    at: DateTime<Utc>,
    generation: u64,
) {
    sleep_until(at).await;
    if let Some(registry) = registry.upgrade() {
        registry.fire_one_time(&job_id, generation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use cadence_core::NewJob;
    use cadence_store::{JobStore, SqliteJobStore};
    use tokio::sync::watch;

    use crate::pool::{JobHandler, WorkItem, WorkerPool};

    struct Discard;

    #[async_trait]
    impl JobHandler for Discard {
        async fn handle(&self, _item: WorkItem) {}
    }

    struct Fixture {
        store: Arc<dyn JobStore>,
        registry: Arc<ScheduleRegistry>,
        _pool: WorkerPool,
        _clock: watch::Sender<bool>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        let pool = WorkerPool::start(1, 4, Arc::new(Discard));
        let (clock, rx) = watch::channel(false);
        let engine = TriggerEngine::new(Arc::clone(&store), pool.dispatcher(), rx);
        Fixture {
            store,
            registry: ScheduleRegistry::new(engine),
            _pool: pool,
            _clock: clock,
        }
    }

    async fn job(store: &Arc<dyn JobStore>, schedule: Option<&str>, run_at: Option<DateTime<Utc>>) -> Job {
        store
            .create_job(&NewJob {
                name: "registry".to_string(),
                commands: vec!["true".to_string()],
                schedule: schedule.map(str::to_string),
                run_at,
                enabled: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn recurring_job_gets_one_handle() {
        let fx = fixture();
        let job = job(&fx.store, Some("0 0 * * *"), None).await;

        let kind = fx.registry.register(&job).await.unwrap();
        assert_eq!(
            kind,
            Some(HandleKind::Recurring {
                expression: "0 0 * * *".to_string()
            })
        );
        // Re-registering replaces rather than adds.
        fx.registry.register(&job).await.unwrap();
        assert_eq!(fx.registry.handle_count().await, 1);
    }

    #[tokio::test]
    async fn disabled_job_is_removed_on_register() {
        let fx = fixture();
        let mut job = job(&fx.store, Some("0 0 * * *"), None).await;
        fx.registry.register(&job).await.unwrap();
        assert!(fx.registry.is_registered(&job.id).await);

        job.enabled = false;
        assert_eq!(fx.registry.register(&job).await.unwrap(), None);
        assert!(!fx.registry.is_registered(&job.id).await);
    }

    #[tokio::test]
    async fn past_run_at_without_schedule_is_a_no_op() {
        let fx = fixture();
        let mut job = job(&fx.store, Some("0 0 * * *"), None).await;
        job.schedule = None;
        job.run_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert_eq!(fx.registry.register(&job).await.unwrap(), None);
        assert!(!fx.registry.is_registered(&job.id).await);
    }

    #[tokio::test]
    async fn future_run_at_takes_priority_over_schedule() {
        let fx = fixture();
        let at = Utc::now() + chrono::Duration::hours(1);
        let job = job(&fx.store, Some("0 0 * * *"), Some(at)).await;
        assert_eq!(
            fx.registry.register(&job).await.unwrap(),
            Some(HandleKind::OneTime { at })
        );
    }

    #[tokio::test]
    async fn invalid_schedule_leaves_job_unregistered() {
        let fx = fixture();
        let mut job = job(&fx.store, Some("0 0 * * *"), None).await;
        fx.registry.register(&job).await.unwrap();

        job.schedule = Some("every tuesday".to_string());
        let err = fx.registry.register(&job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
        assert!(!fx.registry.is_registered(&job.id).await);
    }

    #[tokio::test]
    async fn shadowed_schedule_is_still_validated() {
        let fx = fixture();
        let at = Utc::now() + chrono::Duration::hours(1);
        let mut job = job(&fx.store, None, Some(at)).await;
        job.schedule = Some("every tuesday".to_string());

        let err = fx.registry.register(&job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
        assert!(!fx.registry.is_registered(&job.id).await);
    }

    #[test]
    fn handle_kind_prints_like_its_trigger() {
        let kind = HandleKind::Recurring {
            expression: "*/5 * * * *".to_string(),
        };
        assert_eq!(kind.to_string(), "recurring `*/5 * * * *`");
        assert_eq!(kind.to_string(), Trigger::from(&kind).to_string());
    }

    #[tokio::test]
    async fn blank_commands_are_rejected() {
        let fx = fixture();
        let mut job = job(&fx.store, Some("0 0 * * *"), None).await;
        job.commands = vec!["   ".to_string()];
        let err = fx.registry.register(&job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MissingCommand { .. }));
    }

    #[tokio::test]
    async fn deregister_unknown_is_harmless() {
        let fx = fixture();
        assert!(!fx.registry.deregister("missing").await);
    }

    #[tokio::test]
    async fn one_time_fire_removes_handle_and_disables_job() {
        let fx = fixture();
        let at = Utc::now() + chrono::Duration::milliseconds(200);
        let job = job(&fx.store, None, Some(at)).await;
        fx.registry.register(&job).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!fx.registry.is_registered(&job.id).await);
        assert!(!fx.store.get_job(&job.id).await.unwrap().enabled);
        // Already gone; a racing deregister is a no-op.
        assert!(!fx.registry.deregister(&job.id).await);
    }

    #[tokio::test]
    async fn closed_registry_rejects_registration() {
        let fx = fixture();
        let job = job(&fx.store, Some("0 0 * * *"), None).await;
        fx.registry.register(&job).await.unwrap();

        assert_eq!(fx.registry.close().await, 1);
        assert!(matches!(
            fx.registry.register(&job).await,
            Err(SchedulerError::Stopped)
        ));
    }
}

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use cadence_core::{Execution, Job};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One unit of queued work: a job snapshot plus, for manual runs, the
/// execution record created up front.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job: Job,
    pub execution: Option<Execution>,
}

impl WorkItem {
    /// A triggered run; the execution record is created when a worker picks it up.
    pub fn triggered(job: Job) -> Self {
        Self {
            job,
            execution: None,
        }
    }

    /// A manual run whose execution record already exists.
    pub fn manual(job: Job, execution: Execution) -> Self {
        Self {
            job,
            execution: Some(execution),
        }
    }
}

/// What a worker does with a dequeued item.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, item: WorkItem);
}

/// Why a submission was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    Full,
    Stopped,
}

/// Cloneable, non-blocking submission side of a [`WorkerPool`].
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<WorkItem>,
}

impl Dispatcher {
    /// Queue `item` without waiting. When the queue is full or the pool has
    /// shut down the item is dropped and a warning logged.
    pub fn submit(&self, item: WorkItem) -> Result<(), Rejected> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                warn!(job_id = %item.job.id, "worker queue full; run dropped");
                Err(Rejected::Full)
            }
            Err(TrySendError::Closed(item)) => {
                warn!(job_id = %item.job.id, "worker pool stopped; run dropped");
                Err(Rejected::Stopped)
            }
        }
    }
}

/// Fixed set of workers draining a bounded FIFO queue.
///
/// Each worker handles one item at a time, so `size` bounds how many jobs
/// execute concurrently.
pub struct WorkerPool {
    dispatcher: Dispatcher,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    cancel: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue holding at most `capacity` items.
    ///
    /// Both values are clamped to at least 1.
    pub fn start<H: JobHandler>(size: usize, capacity: usize, handler: Arc<H>) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let workers = (0..size)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    cancel.clone(),
                    Arc::clone(&handler),
                ))
            })
            .collect();

        info!(workers = size, capacity, "worker pool started");
        Self {
            dispatcher: Dispatcher { tx },
            rx,
            cancel,
            workers: StdMutex::new(workers),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn submit(&self, item: WorkItem) -> Result<(), Rejected> {
        self.dispatcher.submit(item)
    }

    /// True once [`WorkerPool::shutdown`] has begun.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop dequeuing and wait for in-flight items to finish.
    ///
    /// Closes the queue and returns the items no worker picked up, so the
    /// caller can close out their records. Safe to call twice.
    pub async fn shutdown(&self) -> Vec<WorkItem> {
        self.cancel.cancel();
        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut leftover = Vec::new();
        while let Ok(item) = rx.try_recv() {
            leftover.push(item);
        }
        info!(leftover = leftover.len(), "worker pool drained");
        leftover
    }
}

async fn worker_loop<H: JobHandler>(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    cancel: CancellationToken,
    handler: Arc<H>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = async { rx.lock().await.recv().await } => item,
        };
        let Some(item) = next else { break };

        debug!(worker, job_id = %item.job.id, "worker picked up job");
        // Not raced against `cancel`: a started run always completes.
        handler.handle(item).await;
    }
    debug!(worker, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;

    /// Sleeps for a fixed time per item and counts completions.
    struct SlowHandler {
        delay: Duration,
        started: AtomicUsize,
        finished: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowHandler {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobHandler for SlowHandler {
        async fn handle(&self, _item: WorkItem) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn item(id: &str) -> WorkItem {
        let now = Utc::now();
        WorkItem::triggered(Job {
            id: id.to_string(),
            name: id.to_string(),
            commands: vec!["true".to_string()],
            schedule: None,
            run_at: None,
            enabled: true,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overflow_is_dropped_and_pool_stays_responsive() {
        let handler = SlowHandler::new(Duration::from_millis(300));
        let pool = WorkerPool::start(1, 1, Arc::clone(&handler));

        let accepted = (0..6)
            .map(|i| pool.submit(item(&format!("burst-{i}"))))
            .filter(Result::is_ok)
            .count();
        // One item in the worker at most, one in the queue.
        assert!((1..=2).contains(&accepted), "accepted {accepted}");

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(handler.finished.load(Ordering::SeqCst), accepted);

        assert!(pool.submit(item("after-burst")).is_ok());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.shutdown().await.is_empty());
        assert_eq!(handler.finished.load(Ordering::SeqCst), accepted + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_bounded_by_pool_size() {
        let handler = SlowHandler::new(Duration::from_millis(150));
        let pool = WorkerPool::start(2, 16, Arc::clone(&handler));
        for i in 0..6 {
            assert!(pool.submit(item(&format!("job-{i}"))).is_ok());
        }
        tokio::time::sleep(Duration::from_millis(700)).await;
        pool.shutdown().await;
        assert_eq!(handler.finished.load(Ordering::SeqCst), 6);
        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_waits_for_in_flight_work() {
        let handler = SlowHandler::new(Duration::from_millis(400));
        let pool = WorkerPool::start(1, 4, Arc::clone(&handler));
        assert!(pool.submit(item("long")).is_ok());

        // Let the worker pick it up before cancelling.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;
        assert_eq!(handler.started.load(Ordering::SeqCst), 1);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let handler = SlowHandler::new(Duration::from_millis(1));
        let pool = WorkerPool::start(2, 4, handler);
        pool.shutdown().await;
        assert!(pool.is_stopped());
        assert_eq!(pool.submit(item("late")), Err(Rejected::Stopped));
        // Second shutdown is a no-op.
        assert!(pool.shutdown().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_hands_back_unstarted_items() {
        let handler = SlowHandler::new(Duration::from_millis(400));
        let pool = WorkerPool::start(1, 4, Arc::clone(&handler));
        assert!(pool.submit(item("running")).is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.submit(item("queued-1")).is_ok());
        assert!(pool.submit(item("queued-2")).is_ok());

        let leftover = pool.shutdown().await;
        let ids: Vec<_> = leftover.iter().map(|i| i.job.id.as_str()).collect();
        assert_eq!(ids, vec!["queued-1", "queued-2"]);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
    }
}

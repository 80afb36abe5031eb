//! `cadence-scheduler` — triggers jobs on time and runs them with bounded concurrency.
//!
//! # Overview
//!
//! The [`Scheduler`] keeps one in-memory handle per enabled job in a
//! [`ScheduleRegistry`]. Handles fire into a bounded [`WorkerPool`]; each
//! worker hands the job to the [`FanoutExecutor`], which runs all of the
//! job's commands concurrently and records a single execution.
//!
//! # Trigger kinds
//!
//! | Kind        | Armed when                                  | After firing            |
//! |-------------|---------------------------------------------|-------------------------|
//! | One-time    | `run_at` is strictly in the future          | handle removed, job disabled |
//! | Recurring   | otherwise, if `schedule` is set             | re-armed for the next instant |
//!
//! Every fire reloads the job from the store by id. Runs that do not fit in
//! the queue are dropped with a warning.

pub mod engine;
pub mod error;
pub mod executor;
pub mod pool;
pub mod recorder;
pub mod registry;
pub mod schedule;
mod trigger;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use executor::{FanoutExecutor, FanoutReport};
pub use pool::{Dispatcher, JobHandler, Rejected, WorkItem, WorkerPool};
pub use recorder::ExecutionRecorder;
pub use registry::{HandleKind, ScheduleRegistry};
pub use schedule::CronSchedule;

//! `cadence-store` — persistence boundary for jobs and executions.
//!
//! The scheduler talks to storage only through the [`JobStore`] trait.
//! [`SqliteJobStore`] is the bundled implementation: one SQLite file with a
//! `jobs` and an `executions` table, migrated idempotently on open.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteJobStore;
pub use store::JobStore;

//! cadence-runner — executes a single shell command under a hard timeout.
//!
//! The runner holds no state between calls. Every outcome, including launch
//! failures and timeouts, comes back as a [`CommandOutcome`] so callers can
//! record it without special error paths.

pub mod runner;
pub mod truncate;
pub mod types;

pub use runner::CommandRunner;
pub use types::{CommandOutcome, RunOptions};

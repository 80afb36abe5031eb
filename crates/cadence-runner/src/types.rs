//! Shared data types for cadence-runner.

use std::time::Duration;

use cadence_core::config::RunnerConfig;
use serde::{Deserialize, Serialize};

/// How a single command is launched and bounded.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Hard wall-clock limit; the child is killed when it elapses.
    pub timeout: Duration,
    /// Cap on captured output per command (chars).
    pub max_output_chars: usize,
    /// Shell used as `<shell> -c <command>` on Unix.
    pub shell: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RunOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_chars: config.max_output_chars,
            shell: config.shell.clone(),
        }
    }
}

/// Result of running one command. Failure is data, never an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// stdout followed by stderr, plus an `Error: ...` line on failure.
    pub output: String,
    pub success: bool,
    /// `None` when the process never exited normally (spawn failure,
    /// timeout, signal).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub(crate) fn succeeded(output: String, exit_code: i32) -> Self {
        Self {
            output,
            success: true,
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }

    /// Build a failed outcome, appending `Error: {reason}` to whatever was captured.
    pub fn failed(captured: &str, reason: &str) -> Self {
        Self {
            output: with_error_marker(captured, reason),
            success: false,
            exit_code: None,
            timed_out: false,
        }
    }
}

/// `captured` followed by an `Error: {reason}` line.
pub fn with_error_marker(captured: &str, reason: &str) -> String {
    if captured.is_empty() {
        format!("Error: {reason}")
    } else if captured.ends_with('\n') {
        format!("{captured}Error: {reason}")
    } else {
        format!("{captured}\nError: {reason}")
    }
}

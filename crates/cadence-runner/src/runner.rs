//! `CommandRunner` — runs one shell command with a hard timeout.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    truncate::truncate_middle,
    types::{CommandOutcome, RunOptions},
};

/// Stateless executor for single shell commands.
///
/// Cheap to clone; every call spawns its own child process.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    options: RunOptions,
}

impl CommandRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Execute `command` through the shell and capture its output.
    ///
    /// Never returns an error: a non-zero exit, a timeout or a spawn failure
    /// all produce `success = false` with an `Error: ...` marker appended to
    /// the captured output. On timeout the child is killed.
    pub async fn run(&self, command: &str) -> CommandOutcome {
        debug!(command, "running command");
        let started = Instant::now();

        let child = match self
            .shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout drops the child, which kills it.
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "command failed to start");
                return CommandOutcome::failed("", &format!("failed to start: {e}"));
            }
        };

        let outcome =
            match tokio::time::timeout(self.options.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => {
                    let captured = self.capture(&output.stdout, &output.stderr);
                    match output.status.code() {
                        Some(0) => CommandOutcome::succeeded(captured, 0),
                        Some(code) => CommandOutcome {
                            exit_code: Some(code),
                            ..CommandOutcome::failed(&captured, &format!("exit status {code}"))
                        },
                        None => CommandOutcome::failed(&captured, "terminated by signal"),
                    }
                }
                Ok(Err(e)) => CommandOutcome::failed("", &format!("failed to collect output: {e}")),
                Err(_elapsed) => {
                    let secs = self.options.timeout.as_secs_f64();
                    warn!(command, timeout_secs = secs, "command timed out; killed");
                    CommandOutcome {
                        timed_out: true,
                        ..CommandOutcome::failed("", &format!("timed out after {secs}s"))
                    }
                }
            };

        debug!(
            command,
            success = outcome.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        outcome
    }

    #[cfg(not(windows))]
    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.options.shell);
        cmd.arg("-c").arg(command);
        cmd
    }

    #[cfg(windows)]
    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }

    /// stdout then stderr, lossily decoded and bounded.
    fn capture(&self, stdout: &[u8], stderr: &[u8]) -> String {
        let mut text = String::from_utf8_lossy(stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(stderr));
        truncate_middle(&text, self.options.max_output_chars)
    }
}

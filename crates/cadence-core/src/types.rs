use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// A persisted unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the job store.
    pub id: String,
    /// Display label only.
    pub name: String,
    /// Shell commands in execution-report order.
    pub commands: Vec<String>,
    /// Recurring expression (5 or 6 cron fields).
    pub schedule: Option<String>,
    /// Absolute instant for a one-time run.
    pub run_at: Option<DateTime<Utc>>,
    /// Only enabled jobs may hold a trigger.
    pub enabled: bool,
    /// Completion time of the last execution; written by the execution path.
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// The commands that will actually run: trimmed, non-blank, in order.
    pub fn command_list(&self) -> Vec<String> {
        normalize_commands(&self.commands)
    }

    /// The trigger source that should be armed for this job at `now`.
    ///
    /// Ignores `enabled`; callers decide whether a disabled job gets a handle.
    pub fn trigger(&self, now: DateTime<Utc>) -> Trigger {
        Trigger::for_job(self, now)
    }
}

/// Fields supplied by a caller when creating a job; the store fills in the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub commands: Vec<String>,
    pub schedule: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl NewJob {
    /// Boundary checks applied before a job is accepted.
    ///
    /// Schedule syntax is checked later, at registration time.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if normalize_commands(&self.commands).is_empty() {
            return Err(CadenceError::InvalidJob(
                "at least one non-blank command is required".to_string(),
            ));
        }
        let has_schedule = self
            .schedule
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !has_schedule && self.run_at.is_none() {
            return Err(CadenceError::InvalidJob(
                "either a schedule or a run_at time is required".to_string(),
            ));
        }
        if let Some(at) = self.run_at {
            if at <= now {
                return Err(CadenceError::InvalidJob(format!(
                    "run_at {} is not in the future",
                    at.to_rfc3339()
                )));
            }
        }
        Ok(())
    }
}

/// One firing of a job, scheduled or manual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    /// `None` while running, or forever if the process died mid-run.
    pub finished_at: Option<DateTime<Utc>>,
    /// Only meaningful once `finished_at` is set.
    pub success: bool,
    /// Per-command outputs in command order, newline separated.
    pub output: String,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    /// A not-yet-persisted execution starting at `started_at`.
    ///
    /// `id` is empty until the store assigns one.
    pub fn started(job_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            job_id: job_id.to_string(),
            started_at,
            finished_at: None,
            success: false,
            output: String::new(),
            created_at: started_at,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Which trigger, if any, a job should be armed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Recurring(String),
    OneTime(DateTime<Utc>),
    None,
}

impl Trigger {
    /// Select the active trigger source for `job` at `now`.
    ///
    /// A future `run_at` wins over `schedule`. A past `run_at` is ignored, so
    /// a job carrying only a stale `run_at` resolves to `Trigger::None`.
    pub fn for_job(job: &Job, now: DateTime<Utc>) -> Self {
        if let Some(at) = job.run_at {
            if at > now {
                return Trigger::OneTime(at);
            }
        }
        match job.schedule.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => Trigger::Recurring(expr.to_string()),
            _ => Trigger::None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Recurring(expr) => write!(f, "recurring `{expr}`"),
            Trigger::OneTime(at) => write!(f, "one-time at {}", at.to_rfc3339()),
            Trigger::None => f.write_str("none"),
        }
    }
}

/// Flatten, trim and drop blank entries, keeping order.
///
/// Entries may themselves be newline-delimited blobs (the stored form), so
/// `["a\nb", "c"]` and `["a", "b", "c"]` normalize identically.
pub fn normalize_commands<S: AsRef<str>>(commands: &[S]) -> Vec<String> {
    commands
        .iter()
        .flat_map(|c| c.as_ref().lines())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Newline-joined storage form of a command list.
pub fn join_commands<S: AsRef<str>>(commands: &[S]) -> String {
    commands
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job(schedule: Option<&str>, run_at: Option<DateTime<Utc>>) -> Job {
        let now = Utc::now();
        Job {
            id: "job-1".to_string(),
            name: "test".to_string(),
            commands: vec!["echo hi".to_string()],
            schedule: schedule.map(str::to_string),
            run_at,
            enabled: true,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn normalize_trims_and_drops_blanks() {
        let cmds = ["echo a", "", "  echo b  ", "   "];
        assert_eq!(normalize_commands(&cmds), vec!["echo a", "echo b"]);
    }

    #[test]
    fn raw_blob_normalizes_like_a_list() {
        let blob = ["echo a\n\necho b\r\n"];
        assert_eq!(normalize_commands(&blob), vec!["echo a", "echo b"]);
    }

    #[test]
    fn join_then_normalize_preserves_order() {
        let cmds = vec!["echo 3", "echo 1", "echo 2"];
        let stored = join_commands(&cmds);
        assert_eq!(normalize_commands(&[stored]), cmds);
    }

    #[test]
    fn future_run_at_wins_over_schedule() {
        let now = Utc::now();
        let at = now + Duration::minutes(5);
        let j = job(Some("* * * * *"), Some(at));
        assert_eq!(j.trigger(now), Trigger::OneTime(at));
    }

    #[test]
    fn past_run_at_falls_back_to_schedule() {
        let now = Utc::now();
        let j = job(Some("*/5 * * * *"), Some(now - Duration::minutes(1)));
        assert_eq!(j.trigger(now), Trigger::Recurring("*/5 * * * *".to_string()));
    }

    #[test]
    fn past_run_at_without_schedule_is_none() {
        let now = Utc::now();
        let j = job(None, Some(now - Duration::seconds(1)));
        assert_eq!(j.trigger(now), Trigger::None);
    }

    #[test]
    fn trigger_display() {
        let at = "2030-01-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(Trigger::OneTime(at).to_string(), "one-time at 2030-01-01T08:00:00+00:00");
        assert_eq!(Trigger::Recurring("0 3 * * *".into()).to_string(), "recurring `0 3 * * *`");
        assert_eq!(Trigger::None.to_string(), "none");
    }

    #[test]
    fn run_at_equal_to_now_is_not_future() {
        let now = Utc::now();
        let j = job(Some("  "), Some(now));
        assert_eq!(j.trigger(now), Trigger::None);
    }

    #[test]
    fn validate_requires_commands_and_a_trigger_source() {
        let now = Utc::now();
        let mut new = NewJob {
            name: "backup".to_string(),
            commands: vec!["   ".to_string()],
            schedule: Some("0 3 * * *".to_string()),
            run_at: None,
            enabled: true,
        };
        assert!(new.validate(now).is_err());

        new.commands = vec!["tar czf /tmp/b.tgz /etc".to_string()];
        assert!(new.validate(now).is_ok());

        new.schedule = None;
        assert!(new.validate(now).is_err());

        new.run_at = Some(now - Duration::seconds(5));
        assert!(new.validate(now).is_err());

        new.run_at = Some(now + Duration::seconds(5));
        assert!(new.validate(now).is_ok());
    }
}

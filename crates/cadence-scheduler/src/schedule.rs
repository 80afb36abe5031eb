use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

/// Longest single sleep while waiting for a wall-clock instant. Waking up
/// periodically lets long waits notice wall-clock adjustments.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

/// A parsed recurring schedule.
///
/// Accepts standard crontab expressions with 5 fields
/// (`min hour dom month dow`) or 6 fields with a leading seconds field.
/// Day-of-week follows crontab numbering: 0 and 7 are Sunday, 1 is Monday.
/// All evaluation happens in UTC.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    inner: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };
        let normalized = normalize_expression(expression).map_err(invalid)?;
        let inner = cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            expression: expression.trim().to_string(),
            inner,
        })
    }

    /// The expression as written by the user.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, if the schedule has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }
}

/// Delay until a one-time `run_at`, or `None` unless it is strictly after `now`.
pub fn one_time_delay(run_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    if run_at <= now {
        return None;
    }
    (run_at - now).to_std().ok()
}

/// Sleep until the wall clock reaches `at`. Returns at once for past instants.
pub(crate) async fn sleep_until(at: DateTime<Utc>) {
    while let Some(remaining) = one_time_delay(at, Utc::now()) {
        tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)).await;
    }
}

/// Rewrite a crontab expression into the 6-field, Quartz-numbered form the
/// `cron` crate evaluates.
fn normalize_expression(expression: &str) -> std::result::Result<String, String> {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(format!("expected 5 or 6 fields, found {n}")),
    }
    fields[5] = translate_day_of_week(&fields[5])?;
    Ok(fields.join(" "))
}

/// Map crontab day-of-week numbers (0/7 = Sunday) to Quartz numbers
/// (1 = Sunday ... 7 = Saturday). Names and bare wildcards pass through.
///
/// Numeric ranges and steps are expanded to explicit lists, so `1-5` becomes
/// `2,3,4,5,6` and `5-7` correctly includes Sunday.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    let parts = field
        .split(',')
        .map(translate_day_of_week_part)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(parts.join(","))
}

fn translate_day_of_week_part(part: &str) -> std::result::Result<String, String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: usize = step
                .parse()
                .map_err(|_| format!("invalid day-of-week step `{step}`"))?;
            if step == 0 {
                return Err("day-of-week step must be positive".to_string());
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (first, last) = if range == "*" || range == "?" {
        match step {
            None => return Ok(part.to_string()),
            Some(_) => (0, 6),
        }
    } else if let Some((a, b)) = range.split_once('-') {
        match (a.parse::<u32>(), b.parse::<u32>()) {
            (Ok(a), Ok(b)) => (a, b),
            // Named ranges like MON-FRI are understood by the evaluator as-is.
            _ => return Ok(part.to_string()),
        }
    } else {
        match range.parse::<u32>() {
            Ok(n) if step.is_some() => (n, 6),
            Ok(n) => (n, n),
            Err(_) => return Ok(part.to_string()),
        }
    };

    if first > 7 || last > 7 {
        return Err(format!("day-of-week `{part}` out of range 0-7"));
    }
    if first > last {
        return Err(format!("day-of-week range `{part}` is reversed"));
    }

    let mut days: Vec<u32> = (first..=last)
        .step_by(step.unwrap_or(1))
        .map(|d| if d == 7 { 1 } else { d + 1 })
        .collect();
    days.sort_unstable();
    days.dedup();
    Ok(days
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

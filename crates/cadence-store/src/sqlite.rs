use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cadence_core::{join_commands, Execution, Job, NewJob};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, StoreError},
    store::JobStore,
};

const JOB_COLUMNS: &str = "id, name, commands, schedule, run_at, enabled, last_run_at,
                           created_at, updated_at";
const EXECUTION_COLUMNS: &str =
    "id, job_id, started_at, finished_at, success, output, created_at";

/// SQLite-backed [`JobStore`].
///
/// Wraps a single connection in a `Mutex`; every operation is one short
/// statement, so contention stays low for a single-process scheduler.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        info!(path, "job store opened");
        Self::new(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("job store connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn find_enabled_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE enabled = 1 ORDER BY created_at, rowid"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn get_job(&self, id: &str) -> Result<Job> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            [id],
            row_to_job,
        )
        .optional()?
        .ok_or_else(|| StoreError::JobNotFound { id: id.to_string() })
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn save_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE jobs
             SET name = ?1, commands = ?2, schedule = ?3, run_at = ?4, enabled = ?5,
                 last_run_at = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                job.name,
                join_commands(&job.commands),
                job.schedule,
                job.run_at,
                job.enabled,
                job.last_run_at,
                Utc::now(),
                job.id,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::JobNotFound { id: job.id.clone() });
        }
        debug!("job saved");
        Ok(())
    }

    #[instrument(skip(self, exec), fields(job_id = %exec.job_id))]
    async fn create_execution(&self, exec: &Execution) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO executions
             (id, job_id, started_at, finished_at, success, output, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                exec.job_id,
                exec.started_at,
                exec.finished_at,
                exec.success,
                exec.output,
                exec.created_at,
            ],
        )?;
        debug!(execution_id = %id, "execution created");
        Ok(id)
    }

    async fn get_execution(&self, id: &str) -> Result<Execution> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
            [id],
            row_to_execution,
        )
        .optional()?
        .ok_or_else(|| StoreError::ExecutionNotFound { id: id.to_string() })
    }

    #[instrument(skip(self, exec), fields(execution_id = %exec.id))]
    async fn save_execution(&self, exec: &Execution) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE executions
             SET started_at = ?1, finished_at = ?2, success = ?3, output = ?4
             WHERE id = ?5",
            params![
                exec.started_at,
                exec.finished_at,
                exec.success,
                exec.output,
                exec.id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::ExecutionNotFound {
                id: exec.id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    async fn create_job(&self, new: &NewJob) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7().to_string(),
            name: new.name.clone(),
            commands: new.commands.clone(),
            schedule: new.schedule.clone(),
            run_at: new.run_at,
            enabled: new.enabled,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO jobs
             (id, name, commands, schedule, run_at, enabled, last_run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)",
            params![
                job.id,
                job.name,
                join_commands(&job.commands),
                job.schedule,
                job.run_at,
                job.enabled,
                now,
            ],
        )?;
        info!(job_id = %job.id, "job created");
        Ok(job)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at, rowid"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    async fn list_executions(&self, job_id: Option<&str>, limit: usize) -> Result<Vec<Execution>> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match job_id {
            Some(job_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions
                     WHERE job_id = ?1
                     ORDER BY started_at DESC, rowid DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![job_id, limit], row_to_execution)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions
                     ORDER BY started_at DESC, rowid DESC
                     LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(params![limit], row_to_execution)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }
}

/// Map a `jobs` row (in [`JOB_COLUMNS`] order) to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let commands: String = row.get(2)?;
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        commands: split_commands(&commands),
        schedule: row.get(3)?,
        run_at: row.get(4)?,
        enabled: row.get(5)?,
        last_run_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    Ok(Execution {
        id: row.get(0)?,
        job_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        success: row.get(4)?,
        output: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Inverse of [`join_commands`]. An empty column means no commands at all.
fn split_commands(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split('\n').map(str::to_string).collect()
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the job store schema in `conn`.
///
/// Creates the `jobs` and `executions` tables (idempotent). Commands are kept
/// as newline-joined text, in order.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id           TEXT    NOT NULL PRIMARY KEY,
            name         TEXT    NOT NULL,
            commands     TEXT    NOT NULL,   -- newline-joined, order significant
            schedule     TEXT,               -- cron expression or NULL
            run_at       TEXT,               -- one-time instant or NULL
            enabled      INTEGER NOT NULL DEFAULT 1,
            last_run_at  TEXT,
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_enabled ON jobs (enabled);

        CREATE TABLE IF NOT EXISTS executions (
            id           TEXT    NOT NULL PRIMARY KEY,
            job_id       TEXT    NOT NULL REFERENCES jobs (id) ON DELETE CASCADE,
            started_at   TEXT    NOT NULL,
            finished_at  TEXT,               -- NULL while running (or lost)
            success      INTEGER NOT NULL DEFAULT 0,
            output       TEXT    NOT NULL DEFAULT '',
            created_at   TEXT    NOT NULL
        ) STRICT;

        -- Listing: WHERE job_id = ? ORDER BY created_at DESC
        CREATE INDEX IF NOT EXISTS idx_executions_job_created
            ON executions (job_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_executions_created ON executions (created_at);
        ",
    )?;
    Ok(())
}

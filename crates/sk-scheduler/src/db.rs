//! SQLite persistence for scheduled jobs and their execution history.
//!
//! Grounded on the teacher's `skynet-scheduler/src/db.rs` (`STRICT` tables,
//! idempotent `CREATE TABLE IF NOT EXISTS`, an index on the polling column)
//! extended with the `job_executions` observability table SPEC_FULL.md
//! requires (§3 `JobExecution`, §8 property 8's reload determinism) and a
//! 30-day retention sweep.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::types::{JobExecution, JobRunStatus};

pub const RETENTION: Duration = Duration::days(30);

/// Initialise the scheduler schema in `conn`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id              TEXT    NOT NULL PRIMARY KEY,
            job_name        TEXT    NOT NULL,
            skill_name      TEXT    NOT NULL,
            schedule        TEXT    NOT NULL,
            target_channel  TEXT    NOT NULL,
            enabled         INTEGER NOT NULL,
            overlap_policy  TEXT    NOT NULL DEFAULT 'drop',
            identity_key    TEXT    NOT NULL,
            next_run        TEXT,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_jobs_identity
            ON scheduled_jobs (identity_key);
        CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_run
            ON scheduled_jobs (next_run);

        CREATE TABLE IF NOT EXISTS job_executions (
            job_id          TEXT    NOT NULL,
            started_at      TEXT    NOT NULL,
            completed_at    TEXT,
            status          TEXT    NOT NULL,
            duration_ms     INTEGER,
            output_snippet  TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_executions_started_at
            ON job_executions (started_at);
        ",
    )?;
    Ok(())
}

pub fn record_execution(conn: &Connection, exec: &JobExecution) -> Result<()> {
    conn.execute(
        "INSERT INTO job_executions (job_id, started_at, completed_at, status, duration_ms, output_snippet)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            exec.job_id,
            exec.started_at.to_rfc3339(),
            exec.completed_at.map(|t| t.to_rfc3339()),
            exec.status.to_string(),
            exec.duration_ms,
            exec.output_snippet,
        ],
    )?;
    Ok(())
}

/// Delete execution rows older than [`RETENTION`]. Returns the row count removed.
pub fn sweep_old_executions(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = (now - RETENTION).to_rfc3339();
    let n = conn.execute("DELETE FROM job_executions WHERE started_at < ?1", [cutoff])?;
    Ok(n)
}

pub fn recent_executions(conn: &Connection, job_id: &str, limit: usize) -> Result<Vec<JobExecution>> {
    let mut stmt = conn.prepare(
        "SELECT job_id, started_at, completed_at, status, duration_ms, output_snippet
         FROM job_executions WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![job_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .filter_map(|r| {
            let (job_id, started_at, completed_at, status, duration_ms, output_snippet) = r.ok()?;
            Some(JobExecution {
                job_id,
                started_at: DateTime::parse_from_rfc3339(&started_at).ok()?.with_timezone(&Utc),
                completed_at: completed_at
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|t| t.with_timezone(&Utc)),
                status: status.parse::<JobRunStatus>().ok()?,
                duration_ms: duration_ms.map(|v| v as u64),
                output_snippet,
            })
        })
        .collect();
    Ok(rows)
}

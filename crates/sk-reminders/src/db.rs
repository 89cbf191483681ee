//! SQLite persistence and the claim-based polling query.
//!
//! Grounded on `skynet-sessions/src/manager.rs`'s `get_or_create`
//! (`INSERT OR IGNORE` + read-back to survive races) and
//! `skynet-scheduler/src/db.rs`'s `STRICT` schema idiom — adapted here into
//! a conditional `UPDATE ... WHERE status = 'pending'` claim so two
//! concurrent delivery workers can race the same row and only one wins.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, ReminderError};
use crate::types::{Reminder, ReminderPatch, ReminderStatus};

pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                  TEXT    NOT NULL PRIMARY KEY,
            user_id             TEXT    NOT NULL,
            channel_id          TEXT    NOT NULL,
            task_text           TEXT    NOT NULL,
            run_at_utc          TEXT    NOT NULL,
            created_at          TEXT    NOT NULL,
            delivered_at        TEXT,
            status              TEXT    NOT NULL DEFAULT 'pending',
            delivery_attempts   INTEGER NOT NULL DEFAULT 0,
            claimed_by          TEXT,
            claimed_at          TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_due
            ON reminders (status, run_at_utc);
        ",
    )?;
    Ok(())
}

pub fn create(conn: &Connection, user_id: &str, channel_id: &str, task_text: &str, run_at_utc: DateTime<Utc>) -> Result<Reminder> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO reminders (id, user_id, channel_id, task_text, run_at_utc, created_at, status, delivery_attempts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0)",
        rusqlite::params![id, user_id, channel_id, task_text, run_at_utc.to_rfc3339(), now.to_rfc3339()],
    )?;
    Ok(Reminder {
        id,
        user_id: user_id.to_string(),
        channel_id: channel_id.to_string(),
        task_text: task_text.to_string(),
        run_at_utc,
        created_at: now,
        delivered_at: None,
        status: ReminderStatus::Pending,
        delivery_attempts: 0,
    })
}

pub fn list_pending_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, channel_id, task_text, run_at_utc, created_at, delivered_at, status, delivery_attempts
         FROM reminders WHERE user_id = ?1 AND status = 'pending' ORDER BY run_at_utc ASC",
    )?;
    let rows = stmt.query_map([user_id], row_to_reminder)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn get_row(conn: &Connection, id: &str) -> Result<Option<Reminder>> {
    conn.query_row(
        "SELECT id, user_id, channel_id, task_text, run_at_utc, created_at, delivered_at, status, delivery_attempts
         FROM reminders WHERE id = ?1",
        [id],
        row_to_reminder,
    )
    .optional()
    .map_err(ReminderError::from)
}

pub fn update(conn: &Connection, id: &str, patch: &ReminderPatch) -> Result<Reminder> {
    let existing = get_row(conn, id)?.ok_or_else(|| ReminderError::NotFound { id: id.to_string() })?;
    if existing.status != ReminderStatus::Pending {
        return Err(ReminderError::NotPending { id: id.to_string() });
    }
    let task_text = patch.task_text.clone().unwrap_or(existing.task_text);
    let run_at_utc = patch.run_at_utc.unwrap_or(existing.run_at_utc);
    let n = conn.execute(
        "UPDATE reminders SET task_text = ?1, run_at_utc = ?2 WHERE id = ?3 AND status = 'pending'",
        rusqlite::params![task_text, run_at_utc.to_rfc3339(), id],
    )?;
    if n == 0 {
        return Err(ReminderError::NotPending { id: id.to_string() });
    }
    Ok(Reminder {
        task_text,
        run_at_utc,
        ..existing
    })
}

/// Sets a cancelled marker, blocking future delivery. Allowed only while
/// pending — mirrors `delivered_at` being claimed by "cancelled" per §4.6.
pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute(
        "UPDATE reminders SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    if n == 0 {
        let existing = get_row(conn, id)?;
        return Err(match existing {
            Some(_) => ReminderError::NotPending { id: id.to_string() },
            None => ReminderError::NotFound { id: id.to_string() },
        });
    }
    Ok(())
}

/// Atomically claim every due, pending reminder for `worker_token`.
///
/// The `UPDATE ... WHERE status = 'pending' AND run_at_utc <= ?` claim is
/// the exactly-once mechanism (§8 property 6, §4.6 invariant): two workers
/// racing the same row can both issue the UPDATE, but only one affects a
/// row per id since the second sees `status` already flipped away from
/// `pending`. The read-back selects only rows this call actually claimed.
pub fn claim_due(conn: &Connection, now: DateTime<Utc>, worker_token: &str) -> Result<Vec<Reminder>> {
    let now_str = now.to_rfc3339();
    conn.execute(
        "UPDATE reminders SET status = 'claimed', claimed_by = ?1, claimed_at = ?2
         WHERE status = 'pending' AND run_at_utc <= ?2",
        rusqlite::params![worker_token, now_str],
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, user_id, channel_id, task_text, run_at_utc, created_at, delivered_at, status, delivery_attempts
         FROM reminders WHERE status = 'claimed' AND claimed_by = ?1",
    )?;
    let rows = stmt.query_map([worker_token], row_to_reminder)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn finalise_delivered(conn: &Connection, id: &str, delivered_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE reminders SET status = 'delivered', delivered_at = ?1 WHERE id = ?2",
        rusqlite::params![delivered_at.to_rfc3339(), id],
    )?;
    Ok(())
}

/// Roll back a failed delivery attempt so the next tick retries, unless the
/// bounded attempt count is exhausted — then mark `failed` permanently.
pub fn rollback_claim_or_fail(conn: &Connection, id: &str) -> Result<()> {
    let attempts: u32 = conn.query_row(
        "UPDATE reminders SET delivery_attempts = delivery_attempts + 1 WHERE id = ?1
         RETURNING delivery_attempts",
        [id],
        |row| row.get(0),
    )?;
    if attempts >= MAX_DELIVERY_ATTEMPTS {
        conn.execute("UPDATE reminders SET status = 'failed' WHERE id = ?1", [id])?;
    } else {
        conn.execute(
            "UPDATE reminders SET status = 'pending', claimed_by = NULL, claimed_at = NULL WHERE id = ?1",
            [id],
        )?;
    }
    Ok(())
}

fn row_to_reminder(row: &rusqlite::Row) -> rusqlite::Result<Reminder> {
    let run_at_utc: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let delivered_at: Option<String> = row.get(6)?;
    let status: String = row.get(7)?;
    Ok(Reminder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel_id: row.get(2)?,
        task_text: row.get(3)?,
        run_at_utc: DateTime::parse_from_rfc3339(&run_at_utc)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        delivered_at: delivered_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        status: status.parse().unwrap_or(ReminderStatus::Pending),
        delivery_attempts: row.get(8)?,
    })
}

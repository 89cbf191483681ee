//! The public `ReminderStore` surface (C6 contracts) plus the exactly-once
//! delivery loop.
//!
//! Grounded on `skynet-sessions/src/manager.rs`'s `Mutex<Connection>`
//! wrapper shape and `skynet-scheduler/src/engine.rs`'s
//! `run(self, shutdown: watch::Receiver<bool>)` polling-loop idiom.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{self, init_db};
use crate::error::Result;
use crate::types::{Reminder, ReminderPatch};

/// Deliver a due reminder to its originating channel via the platform
/// egress. `sk-telegram`/`sk-gateway` supply the real implementation.
#[async_trait]
pub trait ReminderDeliverer: Send + Sync {
    async fn deliver(&self, reminder: &Reminder) -> std::result::Result<(), String>;
}

pub struct ReminderStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReminderStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `Create(user, channel, task, run_at_utc) → id`. Persisted before
    /// returning (§4.6: "monotonic, persisted before returning").
    pub fn create(&self, user_id: &str, channel_id: &str, task_text: &str, run_at_utc: DateTime<Utc>) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let reminder = db::create(&conn, user_id, channel_id, task_text, run_at_utc)?;
        info!(reminder_id = %reminder.id, user_id, run_at_utc = %run_at_utc, "reminder created");
        Ok(reminder.id)
    }

    /// `List(user) → [Reminder]`, pending only, sorted by `run_at_utc` ascending.
    pub fn list(&self, user_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        db::list_pending_for_user(&conn, user_id)
    }

    /// `Update(id, {task?, run_at_utc?})`, allowed only while pending.
    pub fn update(&self, id: &str, patch: ReminderPatch) -> Result<Reminder> {
        let conn = self.conn.lock().unwrap();
        db::update(&conn, id, &patch)
    }

    /// `Delete(id)`, allowed only while pending.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        db::delete(&conn, id)
    }

    /// Run the delivery loop until `shutdown` broadcasts `true`. `cadence`
    /// must be ≤ 30s per §4.6.
    pub async fn run_delivery_loop<D: ReminderDeliverer>(
        self: Arc<Self>,
        deliverer: Arc<D>,
        cadence: StdDuration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let worker_token = Uuid::new_v4().to_string();
        info!(worker_token, "reminder delivery loop started");
        let mut interval = tokio::time::interval(cadence);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_and_deliver(&deliverer, &worker_token).await {
                        error!("reminder delivery poll failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder delivery loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn poll_and_deliver<D: ReminderDeliverer>(&self, deliverer: &Arc<D>, worker_token: &str) -> Result<()> {
        let now = Utc::now();
        let claimed = {
            let conn = self.conn.lock().unwrap();
            db::claim_due(&conn, now, worker_token)?
        };

        for reminder in claimed {
            match deliverer.deliver(&reminder).await {
                Ok(()) => {
                    let conn = self.conn.lock().unwrap();
                    db::finalise_delivered(&conn, &reminder.id, Utc::now())?;
                    info!(reminder_id = %reminder.id, "reminder delivered");
                }
                Err(e) => {
                    warn!(reminder_id = %reminder.id, error = %e, "reminder delivery failed, rolling back claim");
                    let conn = self.conn.lock().unwrap();
                    db::rollback_claim_or_fail(&conn, &reminder.id)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open_store() -> ReminderStore {
        ReminderStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    struct AlwaysSucceeds {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReminderDeliverer for AlwaysSucceeds {
        async fn deliver(&self, _reminder: &Reminder) -> std::result::Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ReminderDeliverer for AlwaysFails {
        async fn deliver(&self, _reminder: &Reminder) -> std::result::Result<(), String> {
            Err("egress unavailable".to_string())
        }
    }

    #[tokio::test]
    async fn due_reminder_is_claimed_and_delivered_exactly_once() {
        let store = Arc::new(open_store());
        let past = Utc::now() - chrono::Duration::seconds(5);
        let id = store.create("u1", "#general", "drink water", past).unwrap();

        let deliverer = Arc::new(AlwaysSucceeds { calls: AtomicUsize::new(0) });
        store.poll_and_deliver(&deliverer, "worker-a").await.unwrap();
        store.poll_and_deliver(&deliverer, "worker-b").await.unwrap();

        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 1);
        assert!(store.list("u1").unwrap().iter().all(|r| r.id != id));
    }

    #[tokio::test]
    async fn not_yet_due_reminder_is_not_claimed() {
        let store = Arc::new(open_store());
        let future = Utc::now() + chrono::Duration::hours(1);
        store.create("u1", "#general", "future task", future).unwrap();

        let deliverer = Arc::new(AlwaysSucceeds { calls: AtomicUsize::new(0) });
        store.poll_and_deliver(&deliverer, "worker-a").await.unwrap();

        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.list("u1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_rolls_back_and_retries() {
        let store = Arc::new(open_store());
        let past = Utc::now() - chrono::Duration::seconds(5);
        let id = store.create("u1", "#general", "drink water", past).unwrap();

        let deliverer = Arc::new(AlwaysFails);
        store.poll_and_deliver(&deliverer, "worker-a").await.unwrap();

        let pending = store.list("u1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn exhausting_retry_budget_marks_failed_and_stops_retrying() {
        let store = Arc::new(open_store());
        let past = Utc::now() - chrono::Duration::seconds(5);
        let id = store.create("u1", "#general", "drink water", past).unwrap();

        let deliverer = Arc::new(AlwaysFails);
        for _ in 0..crate::db::MAX_DELIVERY_ATTEMPTS {
            store.poll_and_deliver(&deliverer, "worker-a").await.unwrap();
        }

        // After exhausting the budget the reminder is no longer pending, so
        // it won't be claimed or listed again.
        assert!(store.list("u1").unwrap().iter().all(|r| r.id != id));
        store.poll_and_deliver(&deliverer, "worker-a").await.unwrap();
    }

    #[test]
    fn update_is_rejected_once_cancelled() {
        let store = open_store();
        let future = Utc::now() + chrono::Duration::hours(1);
        let id = store.create("u1", "#general", "task", future).unwrap();
        store.delete(&id).unwrap();
        let result = store.update(&id, ReminderPatch { task_text: Some("edited".into()), run_at_utc: None });
        assert!(result.is_err());
    }
}

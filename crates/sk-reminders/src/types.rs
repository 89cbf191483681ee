use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §3 `Reminder` — persistent one-shot delivery record.
///
/// Invariant: once `delivered_at` is set, the reminder is never
/// re-delivered; it is mutated only by `sk-reminders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub task_text: String,
    pub run_at_utc: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: ReminderStatus,
    pub delivery_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    /// Provisionally owned by a delivery worker; not yet finalised.
    Claimed,
    Delivered,
    Cancelled,
    Failed,
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Claimed => "claimed",
            ReminderStatus::Delivered => "delivered",
            ReminderStatus::Cancelled => "cancelled",
            ReminderStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "claimed" => Ok(ReminderStatus::Claimed),
            "delivered" => Ok(ReminderStatus::Delivered),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            "failed" => Ok(ReminderStatus::Failed),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

/// Mutable fields accepted by `Update(id, {task?, run_at_utc?})`.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub task_text: Option<String>,
    pub run_at_utc: Option<DateTime<Utc>>,
}

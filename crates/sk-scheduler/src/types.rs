use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §6 schedule grammar: a crontab expression, a fixed-times list, or a
/// windowed interval — each carrying a named IANA timezone.
///
/// Unlike the teacher's `Schedule` enum (`Once`/`Interval`/`Daily`/`Weekly`/
/// a stub `Cron`), this crate implements real cron parsing (the `cron`
/// crate) plus the two additional grammars §6 requires and the teacher
/// never modelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// 5-field crontab expression plus a named timezone.
    Cron { expression: String, tz: String },
    /// Comma-separated `HH:MM` clock times in a named timezone.
    FixedTimes { times: Vec<(u8, u8)>, tz: String },
    /// `every <duration> from HH:MM to HH:MM` in a named timezone.
    Windowed {
        every_secs: u64,
        from: (u8, u8),
        to: (u8, u8),
        tz: String,
    },
}

/// §3 `ScheduledJob.target_channel` — a channel identifier plus suffix flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetChannel {
    pub channel_id: String,
    /// `!quiet` — bypass quiet hours for this job's deliveries.
    pub bypass_quiet_hours: bool,
    /// `+whatsapp` — also mirror to the external SMS-like egress.
    pub mirror_whatsapp: bool,
}

/// Per-job overlap policy (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// A firing while the prior instance runs is dropped. Default.
    #[default]
    Drop,
    /// A firing while the prior instance runs is queued, bounded to 1.
    QueueOne,
}

/// A row in the declarative schedule document (§3 `ScheduledJob`).
///
/// Identity is the `(skill_name, schedule, target_channel)` tuple —
/// duplicates are de-duplicated on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub job_name: String,
    pub skill_name: String,
    pub schedule: Schedule,
    pub target_channel: TargetChannel,
    pub enabled: bool,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

impl ScheduledJob {
    /// The de-duplication key per §3: "(skill, schedule, channel) tuple".
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.skill_name,
            serde_json::to_string(&self.schedule).unwrap_or_default(),
            self.target_channel.channel_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Ok,
    Error,
    Suppressed,
    Dropped,
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobRunStatus::Ok => "ok",
            JobRunStatus::Error => "error",
            JobRunStatus::Suppressed => "suppressed",
            JobRunStatus::Dropped => "dropped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobRunStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(JobRunStatus::Ok),
            "error" => Ok(JobRunStatus::Error),
            "suppressed" => Ok(JobRunStatus::Suppressed),
            "dropped" => Ok(JobRunStatus::Dropped),
            other => Err(format!("unknown job run status: {other}")),
        }
    }
}

/// §3 `JobExecution` — observability record, rolling ~30-day retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub duration_ms: Option<u64>,
    pub output_snippet: Option<String>,
}

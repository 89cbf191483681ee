use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a [`Request`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Scheduled,
    Reminder,
    System,
}

/// A unit of work submitted to the core.
///
/// Created at ingress; dropped once the response pipeline has fully posted
/// or aborted. Not persisted — in-flight requests do not survive a restart.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Uuid,
    pub origin: Origin,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub text_or_skill_ref: String,
    pub received_at: DateTime<Utc>,
    pub cancel_handle: CancellationToken,
}

impl Request {
    pub fn new(origin: Origin, channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            channel_id: channel_id.into(),
            user_id: None,
            text_or_skill_ref: text.into(),
            received_at: Utc::now(),
            cancel_handle: CancellationToken::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Cross-cutting error-kind taxonomy, used for logging and classification.
///
/// Distinct from each crate's own `thiserror` type: this is the vocabulary
/// the pipeline uses to guarantee every terminal request has exactly one
/// outcome (ok, user-visible-error, or suppressed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    TransientUpstream,
    AgentTimeout,
    AgentAbort,
    AgentParseError,
    PlatformEgressRetryable,
    PlatformEgressFatal,
    ScheduleBindingError,
    ReminderDeliveryError,
    CoreBug,
}

/// The three terminal outcomes a Request may have, per §7 propagation rule.
#[derive(Debug, Clone)]
pub enum Outcome {
    Delivered,
    Suppressed,
    Failed(Kind, String),
}

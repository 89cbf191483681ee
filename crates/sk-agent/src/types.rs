use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// §3 `AgentInvocation.final_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Ok,
    Timeout,
    Killed,
    ParseError,
    NonzeroExit,
    Oversize,
}

/// The lifecycle record for one LLM subprocess call.
///
/// Owned exclusively by the Agent Invoker until its result is handed to the
/// Response Pipeline — in-memory only, not durable across restarts.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub input_bytes: usize,
    pub streamed_events: usize,
    pub result_text: String,
    pub final_status: FinalStatus,
    /// Distinct tool names an interim notice was already emitted for.
    pub interim_notices_posted: Vec<String>,
}

/// Caller-supplied callback for interim "still working" notices (§4.1).
/// Invoked synchronously from the NDJSON-reading task; callers that need to
/// forward notices elsewhere should make this cheap (e.g. a channel send).
pub type InterimNotifier = Arc<dyn Fn(String) + Send + Sync>;

/// Everything the Invoker needs for one call — `envelope` is C4's opaque
/// byte stream, already fully assembled.
pub struct InvokeRequest {
    pub request_id: Uuid,
    pub envelope: String,
    pub model: String,
    /// Caller's preferred deadline; clamped to the configured maximum.
    pub deadline_secs: u64,
    pub cancel: CancellationToken,
    pub on_interim: InterimNotifier,
}

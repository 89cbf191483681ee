//! Wires C1-C7 together into the request-execution path shared by chat
//! ingress, scheduled jobs, and manual `/skill` fires.
//!
//! Grounded on `skynet-agent/src/pipeline/process.rs`'s single
//! assemble-invoke-format pipeline function, generalised here over
//! [`sk_core::Origin`] so the user path and the scheduler path share one
//! implementation rather than the teacher's per-channel duplication.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use sk_agent::{AssembleInput, ContextAssembler, Invoker, InvokeRequest, SkillBlock};
use sk_channels::{Channel, MessageFormat, OutboundMessage, Serialiser};
use sk_core::Origin;
use sk_reminders::{Reminder, ReminderDeliverer};
use sk_response::Payload;
use sk_scheduler::{JobExecutor, ScheduledJob};
use sk_skills::{Skill, SkillRegistry};

const SYSTEM_IDENTITY: &str = "You are Skynet, a personal AI assistant reachable over Telegram. \
Be concise. Use the recent buffer, memory, and knowledge sections only as background context.";

/// Flatten a [`Payload`] list into Telegram's `OutboundMessage` shape and
/// hand each to `channel`. Used by both the scheduler and reminder paths,
/// which (unlike the interactive path) have no `send_response`-style
/// embed-aware caller sitting above the `Channel` boundary.
pub async fn deliver_payloads(channel: &dyn Channel, channel_id: &str, payloads: &[Payload]) {
    for payload in payloads {
        let text = match payload {
            Payload::Text(t) => t.clone(),
            Payload::Embed(e) => {
                let mut out = String::new();
                if let Some(title) = &e.title {
                    out.push_str(title);
                    out.push('\n');
                }
                out.push_str(&e.description);
                for (name, value, _) in &e.fields {
                    out.push_str(&format!("\n{name}: {value}"));
                }
                out
            }
        };
        let msg = OutboundMessage {
            channel_id: channel_id.to_string(),
            text,
            format: MessageFormat::Markdown,
        };
        if let Err(e) = channel.send(&msg).await {
            warn!(channel_id, error = %e, "gateway: failed to deliver payload");
        }
    }
}

/// Shared process-wide handles for the Request Execution Core (C1-C4, plus
/// the hot-reloadable C7 index). Scheduler (C5) and Reminder Store (C6) are
/// owned by `main.rs` directly since they run their own top-level loops;
/// this struct is everything the *request* path needs regardless of origin.
pub struct Core {
    pub serialiser: Arc<Serialiser>,
    pub assembler: Arc<ContextAssembler>,
    pub invoker: Arc<Invoker>,
    pub skills: RwLock<Arc<SkillRegistry>>,
    pub channel: Arc<dyn Channel>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Core {
    /// Replace the live skill index, e.g. on `/reload-schedule`.
    pub fn reload_skills(&self, registry: SkillRegistry) {
        *self.skills.write().unwrap() = Arc::new(registry);
    }

    pub fn skills_snapshot(&self) -> Arc<SkillRegistry> {
        self.skills.read().unwrap().clone()
    }

    /// Run one request end to end: acquire the channel lease, assemble the
    /// envelope (optionally carrying a resolved skill's instructions and
    /// pre-fetched data), invoke the agent, and run the response pipeline.
    /// Shared by the interactive path, manual `/skill` fires, and scheduled
    /// jobs — only `origin` and `raw_mode` vary.
    pub async fn run_request(
        &self,
        origin: Origin,
        channel_id: &str,
        user_text: &str,
        skill: Option<&Skill>,
        raw_mode: bool,
    ) -> Vec<Payload> {
        let cancel = CancellationToken::new();
        let Some(lease) = self.serialiser.acquire(channel_id, cancel.clone()).await else {
            return Vec::new();
        };

        self.serialiser.push_message(channel_id, user_text);
        let recent = self.serialiser.recent_messages(channel_id);

        let skill_block = match skill {
            Some(s) => {
                let registry = self.skills_snapshot();
                let prefetched = match registry.prefetch(s).await {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(skill = %s.name, error = %e, "skill data fetcher failed, envelope degraded");
                        None
                    }
                };
                Some(SkillBlock {
                    name: s.name.clone(),
                    instructions: s.instructions.clone(),
                    prefetched_data: prefetched,
                })
            }
            None => None,
        };

        let envelope = self
            .assembler
            .assemble(AssembleInput {
                channel_id,
                system_identity: SYSTEM_IDENTITY,
                recent_buffer: &recent,
                user_text,
                skill: skill_block,
            })
            .await;

        let request_id = Uuid::new_v4();
        let channel = Arc::clone(&self.channel);
        let notify_channel_id = channel_id.to_string();
        let on_interim = Arc::new(move |notice: String| {
            let channel = Arc::clone(&channel);
            let channel_id = notify_channel_id.clone();
            tokio::spawn(async move {
                let msg = OutboundMessage {
                    channel_id,
                    text: notice,
                    format: MessageFormat::PlainText,
                };
                let _ = channel.send(&msg).await;
            });
        });

        info!(%request_id, channel_id, ?origin, "dispatching request");
        let result = self
            .invoker
            .invoke(InvokeRequest {
                request_id,
                envelope,
                model: self.model.clone(),
                deadline_secs: self.timeout_secs,
                cancel,
                on_interim,
            })
            .await;
        lease.release();

        match result {
            Ok((text, _invocation)) => {
                // Memory capture is fire-and-forget and never gates the
                // response (§2 dataflow, §4.4, DESIGN.md Open Question #3).
                let assembler = Arc::clone(&self.assembler);
                let capture_channel_id = channel_id.to_string();
                let capture_text = text.clone();
                tokio::spawn(async move {
                    assembler.capture(&capture_channel_id, &request_id.to_string(), &capture_text).await;
                });
                sk_response::process(&text, raw_mode, user_text)
            }
            Err(e) => {
                warn!(%request_id, channel_id, error = %e, "agent invocation failed");
                vec![Payload::Text(format!("Sorry, something went wrong: {e}"))]
            }
        }
    }
}

/// Bridges the Scheduler (C5) to the request pipeline. Looks up the fired
/// job's skill, runs it through `Core::run_request`, and delivers the
/// result directly to the job's target channel (the scheduler path has no
/// caller above it to do that, unlike interactive replies).
pub struct GatewayJobExecutor {
    pub core: Arc<Core>,
}

#[async_trait]
impl JobExecutor for GatewayJobExecutor {
    async fn execute(&self, job: &ScheduledJob) -> std::result::Result<String, String> {
        let registry = self.core.skills_snapshot();
        let skill = registry
            .get(&job.skill_name)
            .ok_or_else(|| format!("no such skill: {}", job.skill_name))?
            .clone();

        let user_text = format!("[scheduled job: {}]", job.job_name);
        let payloads = self
            .core
            .run_request(Origin::Scheduled, &job.target_channel.channel_id, &user_text, Some(&skill), false)
            .await;

        deliver_payloads(self.core.channel.as_ref(), &job.target_channel.channel_id, &payloads).await;

        if job.target_channel.mirror_whatsapp {
            // `+whatsapp` asks the job to also mirror to the external
            // SMS-like egress. That collaborator is out of scope for this
            // core (§1) — the flag is honoured by logging the intent so an
            // operator can see it fired, the same inert-by-design
            // accommodation `ChannelSwitch` uses for its stateful peer.
            info!(job = %job.job_name, channel = %job.target_channel.channel_id, "job requested +whatsapp mirror (no egress configured)");
        }

        let snippet = payloads
            .first()
            .map(|p| match p {
                Payload::Text(t) => t.chars().take(200).collect(),
                Payload::Embed(e) => e.description.chars().take(200).collect(),
            })
            .unwrap_or_default();
        Ok(snippet)
    }
}

/// Bridges the Reminder Store (C6) to platform egress. Reminders carry
/// their own plain task text — no agent invocation, no context assembly.
pub struct GatewayReminderDeliverer {
    pub channel: Arc<dyn Channel>,
}

#[async_trait]
impl ReminderDeliverer for GatewayReminderDeliverer {
    async fn deliver(&self, reminder: &Reminder) -> std::result::Result<(), String> {
        let msg = OutboundMessage {
            channel_id: reminder.channel_id.clone(),
            text: format!("Reminder: {}", reminder.task_text),
            format: MessageFormat::Markdown,
        };
        self.channel.send(&msg).await.map_err(|e| e.to_string())
    }
}

pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

//! Implements `sk_telegram`'s [`InboundSink`] — the one place a chat
//! message crosses from the platform adapter into the Request pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use sk_channels::InboundMessage;
use sk_core::Origin;
use sk_response::Payload;
use sk_scheduler::SchedulerEngine;
use sk_telegram::InboundSink;

use crate::commands;
use crate::wiring::{Core, GatewayJobExecutor};

pub struct GatewaySink {
    pub core: Arc<Core>,
    pub scheduler: Arc<SchedulerEngine<GatewayJobExecutor>>,
    pub schedule_path: String,
    pub skills_dir: String,
}

#[async_trait]
impl InboundSink for GatewaySink {
    async fn handle(&self, msg: InboundMessage) -> Vec<Payload> {
        if msg.text.trim_start().starts_with('/') {
            if let Some(payloads) = commands::dispatch(
                &msg.text,
                &msg.channel_id,
                &self.core,
                &self.scheduler,
                &self.schedule_path,
                &self.skills_dir,
            )
            .await
            {
                return payloads;
            }
        }

        let skill = self.core.skills_snapshot().resolve(&msg.text).cloned();
        debug!(channel_id = %msg.channel_id, skill = ?skill.as_ref().map(|s| &s.name), "resolved inbound message");
        self.core
            .run_request(Origin::User, &msg.channel_id, &msg.text, skill.as_ref(), msg.raw)
            .await
    }
}

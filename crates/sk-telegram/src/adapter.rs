//! Telegram channel adapter: wraps a teloxide `Bot` + `Dispatcher` and
//! implements [`sk_channels::Channel`] for egress.
//!
//! Grounded on `skynet-telegram/src/adapter.rs`'s long-polling dispatcher
//! shape. The teacher's `TelegramAppContext` generic dependency-injection
//! trait is replaced by a single `InboundSink` callback — `sk-gateway` owns
//! the Request pipeline, this crate owns only the platform boundary.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::info;

use sk_channels::{Channel, ChannelError, ChannelStatus, InboundMessage, OutboundMessage, Result};
use sk_core::config::TelegramConfig;

use crate::handler::{handle_message, InboundSink};

fn status_code(status: ChannelStatus) -> u8 {
    match status {
        ChannelStatus::Connected => 0,
        ChannelStatus::Connecting => 1,
        ChannelStatus::Disconnected => 2,
        ChannelStatus::Error(_) => 3,
    }
}

/// Telegram channel adapter. Drives the long-polling `Dispatcher` until the
/// process exits; implements [`Channel`] so `sk-gateway` can treat it like
/// any other egress target for scheduled/reminder deliveries.
///
/// Cheaply `Clone` (teloxide's `Bot` is an `Arc` handle internally): one
/// clone is moved into [`TelegramAdapter::run`], another is kept as the
/// `Arc<dyn Channel>` egress handle, both sharing the same `status` cell.
#[derive(Clone)]
pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramConfig,
    status: Arc<AtomicU8>,
}

impl TelegramAdapter {
    pub fn new(config: TelegramConfig) -> Self {
        let bot = Bot::new(&config.bot_token);
        Self {
            bot,
            config,
            status: Arc::new(AtomicU8::new(status_code(ChannelStatus::Disconnected))),
        }
    }

    /// Run the long-polling dispatcher. Never returns under normal
    /// operation. Every accepted inbound message is forwarded to `sink`.
    pub async fn run<S: InboundSink + 'static>(self, sink: Arc<S>) {
        self.status.store(status_code(ChannelStatus::Connected), Ordering::SeqCst);
        info!("telegram: starting long-polling dispatcher");

        let config = self.config.clone();
        let handler = Update::filter_message().endpoint(handle_message::<S>);

        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![sink, config])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}

#[async_trait]
impl Channel for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&self) -> Result<()> {
        self.status.store(status_code(ChannelStatus::Connected), Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.status.store(status_code(ChannelStatus::Disconnected), Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let chat_id = i64::from_str(&msg.channel_id)
            .map(ChatId)
            .map_err(|_| ChannelError::SendFailed(format!("invalid telegram chat id: {}", msg.channel_id)))?;
        crate::send::send_text(&self.bot, chat_id, &msg.text, msg.format).await;
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        match self.status.load(Ordering::SeqCst) {
            0 => ChannelStatus::Connected,
            1 => ChannelStatus::Connecting,
            2 => ChannelStatus::Disconnected,
            _ => ChannelStatus::Error("unknown".to_string()),
        }
    }
}

/// Constructs the `InboundMessage` forwarded from teloxide's handler into
/// the gateway's pipeline.
pub fn inbound_from_text(channel_id: String, user_id: Option<String>, text: &str) -> InboundMessage {
    const RAW_SUFFIX: &str = "--raw";
    let trimmed = text.trim_end();
    let (body, raw) = match trimmed.strip_suffix(RAW_SUFFIX) {
        Some(rest) => (rest.trim_end().to_string(), true),
        None => (trimmed.to_string(), false),
    };
    InboundMessage {
        channel_id,
        user_id,
        text: body,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_suffix_is_detected_and_stripped() {
        let msg = inbound_from_text("c1".into(), None, "show me the logs --raw");
        assert!(msg.raw);
        assert_eq!(msg.text, "show me the logs");
    }

    #[test]
    fn no_raw_suffix_leaves_text_untouched() {
        let msg = inbound_from_text("c1".into(), None, "what's the weather");
        assert!(!msg.raw);
        assert_eq!(msg.text, "what's the weather");
    }
}

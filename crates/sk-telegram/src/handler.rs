//! Telegram message handler registered in the teloxide `Dispatcher`.
//!
//! Grounded on `skynet-telegram/src/handler.rs`'s guard ordering (bot
//! filter, DM guard, mention guard, text extraction, non-blocking
//! pipeline dispatch). The teacher's allowlist/`UserResolver`/session-key
//! construction/media-extraction steps are dropped: spec.md's Non-goal
//! "no multi-tenant isolation" makes per-user allowlisting and identity
//! resolution pointless for a single-operator deployment, and one
//! `ChannelSession` per `channel_id` (§4.3) replaces the teacher's
//! per-user session-key scheme outright.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;

use sk_channels::InboundMessage;
use sk_response::Payload;

use crate::adapter::{inbound_from_text, TelegramConfig};
use crate::send::send_response;

/// Forwards an accepted inbound message into the gateway's Request
/// pipeline and returns the payloads to deliver back to the user.
/// Implemented by `sk-gateway`; this crate only knows the platform.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn handle(&self, msg: InboundMessage) -> Vec<Payload>;
}

pub async fn handle_message<S: InboundSink + 'static>(
    bot: Bot,
    msg: Message,
    sink: Arc<S>,
    config: TelegramConfig,
) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }

    if msg.chat.is_private() && !config.dm_allowed {
        return Ok(());
    }

    let text_for_mention = msg.text().or(msg.caption()).unwrap_or("");
    if (msg.chat.is_group() || msg.chat.is_supergroup()) && config.require_mention {
        let bot_info = bot.get_me().await;
        let bot_username = bot_info
            .as_ref()
            .ok()
            .and_then(|me| me.user.username.as_deref())
            .unwrap_or("");
        if !contains_mention(text_for_mention, bot_username) {
            return Ok(());
        }
    }

    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();
    if text.is_empty() {
        return Ok(());
    }

    let user_id = msg.from.as_ref().map(|u| u.id.0.to_string());
    let channel_id = msg.chat.id.0.to_string();
    let chat_id = msg.chat.id;
    let inbound = inbound_from_text(channel_id, user_id, &text);

    tokio::spawn(async move {
        let payloads = sink.handle(inbound).await;
        for payload in &payloads {
            send_response(&bot, chat_id, payload).await;
        }
    });

    Ok(())
}

/// Return `true` if `text` contains a `@bot_username` mention.
fn contains_mention(text: &str, bot_username: &str) -> bool {
    if bot_username.is_empty() {
        return false;
    }
    let mention = format!("@{bot_username}");
    text.contains(&mention)
}

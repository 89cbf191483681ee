//! Outbound delivery: chunk via `sk_response::chunker`, escape MarkdownV2,
//! fall back to plain text if Telegram rejects the parse mode.
//!
//! Grounded on `skynet-telegram/src/send.rs`'s `send_response()` shape
//! (try-MarkdownV2-then-plain-text, inter-chunk delay) — its own
//! `split_chunks_smart`/`escape_markdown_v2` are replaced by
//! `sk_response::chunker`/this module's escaper so C2's chunker is the
//! single source of truth for the ≤2000-char boundary (§6).

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use sk_channels::MessageFormat;
use sk_response::chunker::{number_chunks, split_chunks_smart};
use sk_response::renderer::{Payload, RenderedEmbed};

/// Escape special characters for Telegram MarkdownV2.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Telegram has no native "embed" concept; render [`RenderedEmbed`] as a
/// plain markdown block (title, description, up to 25 fields, footer).
pub fn render_embed_as_text(embed: &RenderedEmbed) -> String {
    let mut out = String::new();
    if let Some(title) = &embed.title {
        out.push_str(&format!("*{title}*\n"));
    }
    out.push_str(&embed.description);
    for (name, value, _inline) in embed.fields.iter().take(25) {
        out.push_str(&format!("\n*{name}*: {value}"));
    }
    if let Some(footer) = &embed.footer {
        out.push_str(&format!("\n\n_{footer}_"));
    }
    out
}

/// Send `payload` to `chat_id`, chunking text via C2's chunker and
/// rendering embeds as a single atomic message.
pub async fn send_response(bot: &Bot, chat_id: ChatId, payload: &Payload) {
    match payload {
        Payload::Text(text) => {
            let chunks = number_chunks(split_chunks_smart(text));
            send_chunks(bot, chat_id, &chunks).await;
        }
        Payload::Embed(embed) => {
            let text = render_embed_as_text(embed);
            send_chunks(bot, chat_id, &[text]).await;
        }
    }
}

async fn send_chunks(bot: &Bot, chat_id: ChatId, chunks: &[String]) {
    for (i, chunk) in chunks.iter().enumerate() {
        let escaped = escape_markdown_v2(chunk);
        let sent = bot.send_message(chat_id, &escaped).parse_mode(ParseMode::MarkdownV2).await;

        if sent.is_err() {
            if let Err(e) = bot.send_message(chat_id, chunk).await {
                warn!(error = %e, chunk_index = i, "telegram: failed to send plain-text fallback");
            }
        }

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Send already-formatted text (the `Channel::send` path: `sk-gateway` has
/// already run it through C2 and chosen a [`MessageFormat`]).
pub async fn send_text(bot: &Bot, chat_id: ChatId, text: &str, format: MessageFormat) {
    let chunks = number_chunks(split_chunks_smart(text));
    match format {
        MessageFormat::Markdown => send_chunks(bot, chat_id, &chunks).await,
        MessageFormat::Html => {
            for chunk in &chunks {
                if let Err(e) = bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html).await {
                    warn!(error = %e, "telegram: failed to send HTML message");
                }
            }
        }
        MessageFormat::PlainText => {
            for chunk in &chunks {
                if let Err(e) = bot.send_message(chat_id, chunk).await {
                    warn!(error = %e, "telegram: failed to send plain-text message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_response::classifier::Class;
    use sk_response::formatter::Embed;
    use sk_response::renderer::render_embed;

    #[test]
    fn escape_markdown_v2_escapes_specials() {
        let input = "Hello. World! (test) [link]";
        let escaped = escape_markdown_v2(input);
        assert!(escaped.contains("\\."));
        assert!(escaped.contains("\\!"));
        assert!(escaped.contains("\\("));
        assert!(escaped.contains("\\["));
    }

    #[test]
    fn embed_renders_title_fields_and_footer() {
        let embed = Embed {
            title: Some("Status".to_string()),
            description: "All systems nominal.".to_string(),
            fields: vec![("Uptime".to_string(), "3d 2h".to_string(), true)],
            footer: Some("as of now".to_string()),
        };
        let rendered = render_embed(Class::DataTable, embed);
        let text = render_embed_as_text(&rendered);
        assert!(text.contains("*Status*"));
        assert!(text.contains("All systems nominal."));
        assert!(text.contains("*Uptime*: 3d 2h"));
        assert!(text.contains("_as of now_"));
    }
}

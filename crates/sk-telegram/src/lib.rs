//! `sk-telegram` — Telegram platform adapter. Implements [`sk_channels::Channel`]
//! on top of `teloxide`'s long-polling `Dispatcher` (§6 External Interfaces).

pub mod adapter;
pub mod error;
pub mod handler;
pub mod send;

pub use adapter::{inbound_from_text, TelegramAdapter};
pub use error::{Result, TelegramError};
pub use handler::InboundSink;

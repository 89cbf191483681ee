use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChannelStatus, OutboundMessage};

/// A chat-platform egress adapter. The core treats the platform only through
/// this boundary — transport details live in the adapter crate (`sk-telegram`).
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn send(&self, msg: &OutboundMessage) -> Result<()>;

    fn status(&self) -> ChannelStatus;
}

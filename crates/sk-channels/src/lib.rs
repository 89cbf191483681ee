pub mod channel;
pub mod error;
pub mod serialiser;
pub mod types;

pub use channel::Channel;
pub use error::{ChannelError, Result};
pub use serialiser::{Lease, Serialiser};
pub use types::{ChannelStatus, InboundMessage, MessageFormat, OutboundMessage};

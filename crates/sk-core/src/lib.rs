pub mod config;
pub mod error;
pub mod types;

pub use config::SkynetConfig;
pub use error::{Result, SkynetError};
pub use types::{Kind, Origin, Request};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram API error: {0}")]
    Api(String),

    #[error("invalid chat id: {0}")]
    InvalidChatId(String),
}

pub type Result<T> = std::result::Result<T, TelegramError>;

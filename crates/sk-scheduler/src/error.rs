use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid schedule document row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

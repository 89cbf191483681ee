use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("reminder not found: {id}")]
    NotFound { id: String },

    #[error("reminder {id} is no longer pending and cannot be mutated")]
    NotPending { id: String },
}

pub type Result<T> = std::result::Result<T, ReminderError>;

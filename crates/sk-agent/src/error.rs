use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent subprocess: {0}")]
    Spawn(String),

    #[error("I/O error talking to the agent subprocess: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent subprocess timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("agent subprocess was killed")]
    Killed,

    #[error("agent subprocess exited with status {code}: {stderr_excerpt}")]
    NonzeroExit { code: i32, stderr_excerpt: String },

    #[error("agent stdout exceeded the oversize cap ({cap_bytes} bytes)")]
    Oversize { cap_bytes: usize },

    #[error("no `result` record ever arrived and no assistant text was streamed")]
    ParseError,
}

pub type Result<T> = std::result::Result<T, AgentError>;

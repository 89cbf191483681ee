use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("I/O error reading skill documents: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid SKILL.md frontmatter in {path}: {reason}")]
    InvalidFrontmatter { path: String, reason: String },

    #[error("skill not found: {name}")]
    NotFound { name: String },

    #[error("no data fetcher registered for ref: {fetcher_ref}")]
    NoSuchFetcher { fetcher_ref: String },
}

pub type Result<T> = std::result::Result<T, SkillError>;

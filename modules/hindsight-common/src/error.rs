/// Result type alias for hindsight operations.
pub type Result<T> = std::result::Result<T, HindsightError>;

#[derive(Debug, thiserror::Error)]
pub enum HindsightError {
    #[error("No archived content for target: {0}")]
    NotFound(String),

    #[error("Operation not supported by this source: {0}")]
    Unsupported(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidInput(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

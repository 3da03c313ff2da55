use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid review key: {0}")]
    InvalidKey(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no review found for #{0}")]
    ReviewNotFound(u64),

    #[error("No JSON found in output")]
    NoJsonFound,

    #[error("invalid JSON in output: {0}")]
    InvalidJson(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by a [`crate::platform::PlatformApi`] implementation.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),

    #[error("platform request timed out after {0}s")]
    Timeout(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("platform authentication failed: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, ReviewError>;

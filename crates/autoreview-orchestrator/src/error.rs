use autoreview_core::{PlatformError, ReviewError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a review is already in progress for {0}")]
    AlreadyRunning(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AuthFailed(String),

    #[error("review process failed: {0}")]
    Subprocess(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Core(#[from] ReviewError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

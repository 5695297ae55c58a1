//! Errors crossing the container-host boundary.

use thiserror::Error;

/// Error from the container runtime or its transport.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container host error: {0}")]
    Host(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

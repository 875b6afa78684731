//! Server startup error types.

use thiserror::Error;

use orderflow_secrets::SecretError;

/// Errors that abort server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

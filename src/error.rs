//! Error types for the update pipeline.

/// Top-level error type for the self-update pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// A version descriptor was compared against a value of another type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A release payload did not match the expected schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// Version endpoint request or response error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Installer download error (status, headers, transfer, write).
    #[error("download error: {0}")]
    Download(String),

    /// Staged install or install-swap error.
    #[error("install error: {0}")]
    Install(String),

    /// Update script relaunch error.
    #[error("launch error: {0}")]
    Launch(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted update state error.
    #[error("state error: {0}")]
    State(String),

    /// Another update run is already in progress.
    #[error("update already in progress")]
    Busy,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;

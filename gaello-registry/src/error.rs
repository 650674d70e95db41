//! Error types for the gaello-registry crate.

/// Errors that can occur while reading an installed-application registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The platform registry could not be queried (key missing, access denied,
    /// unsupported platform).
    #[error("registry query failed: {0}")]
    Query(String),

    /// Registry or manifest content could not be parsed.
    #[error("registry parse error: {0}")]
    Parse(String),

    /// I/O error while reading a manifest file.
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for registry results.
pub type Result<T> = std::result::Result<T, RegistryError>;

//! Error types for dlprelay

use thiserror::Error;

/// Main error type for everything outside a single relay run
///
/// Failures inside a relay run are reported as [`crate::relay::RelayError`]
/// through the returned [`crate::relay::TransferOutcome`] instead.
#[derive(Error, Debug)]
pub enum DlpRelayError {
    /// Configuration errors (unreadable file, invalid URL, bad TOML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Catalog listing errors
    #[error("Catalog error: {0}")]
    Catalog(String),
}

/// Result type alias for dlprelay operations
pub type Result<T> = std::result::Result<T, DlpRelayError>;

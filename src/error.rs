//! Error types for the voice bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the directive protocol
///
/// Protocol-level failures reported back to the voice assistant live in
/// [`crate::protocol::DirectiveError`]; this enum covers configuration,
/// transport and backend plumbing.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend (home automation hub) error
    #[error("backend error: {0}")]
    Backend(String),

    /// Token introspection or authorization error
    #[error("auth error: {0}")]
    Auth(String),

    /// Inbound request could not be interpreted
    #[error("malformed request: {0}")]
    Malformed(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

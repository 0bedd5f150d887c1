//! Error types for Jibu

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing, malformed, or rejected caller credential
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Required service configuration is absent (operational fault, not a client error)
    #[error("service misconfigured: {0}")]
    MisconfiguredService(String),

    /// Request body could not be parsed
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Hosted backend selected but no API key is configured
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// Upstream rejected the initial call
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Transport-level failure talking to an upstream
    #[error("network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Server lifecycle errors
    #[error("server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

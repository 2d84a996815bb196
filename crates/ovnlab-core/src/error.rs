//! Error types for lab builder operations.
//!
//! One error enum covers the whole workspace: configuration and validation
//! failures surface before any network interaction, the remaining variants
//! cover the OVSDB transport and transaction layer.

use thiserror::Error;

/// Main error type for lab builder operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Lab specification violates a constraint
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed database endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Could not connect to the OVSDB server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unexpected OVSDB JSON-RPC payload
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// OVSDB rejected a transaction
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for lab builder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true when simply re-running the same command may succeed.
    ///
    /// Transport and transaction failures abort mid-run and rely on
    /// idempotent re-invocation as the recovery mechanism; specification
    /// problems will fail the same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Timeout(_) | Self::TransactionFailed(_)
        )
    }
}

// Conversions from external error types
impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionFailed(err.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for Error {
    fn from(err: ipnetwork::IpNetworkError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

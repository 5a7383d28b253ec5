//! Error types for memfed.

use thiserror::Error;

/// Result type alias for memfed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in memfed operations.
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited or server error after {attempts} attempts (status {status}): {body}")]
    RateLimited {
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("Backend rejected request with status {status}: {body}")]
    Protocol { status: u16, body: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Adapter errors
    #[error("Adapter not initialized: {0}")]
    NotInitialized(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    // Audit errors
    #[error("Chain integrity violated at index {0}")]
    ChainIntegrityViolated(u64),

    #[error("Audit entry not found: {0}")]
    AuditEntryNotFound(String),

    #[error("Audit entry already finalized: {0}")]
    AuditEntryFinalized(String),

    // Request validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Content too large: {size} bytes exceeds limit of {max}")]
    ContentTooLarge { size: usize, max: usize },

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // Cryptography errors
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RateLimited { .. } | Error::Timeout(_)
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RateLimited { status, .. } | Error::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Error::SignatureVerificationFailed
    }
}

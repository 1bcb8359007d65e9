//! Error types for the consulta engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using consulta's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for consulta operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Request was malformed or semantically invalid.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uploaded media failed validation (size, extension, magic bytes, OCR quality).
    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Recording not found
    #[error("Recording not found: {0}")]
    RecordingNotFound(uuid::Uuid),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Compare-and-swap lost: the record changed under us.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Submission queue is full.
    #[error("Busy: {0}")]
    Busy(String),

    /// External provider (ASR, LLM, embedder, OCR) is unreachable or erroring.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider rejected the call with a rate limit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// External call exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Work was cancelled by request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Embedding length does not match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::ProviderUnavailable(e.to_string())
        }
    }
}

/// Coarse error classification carried on failed records and mapped by the
/// external HTTP layer onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidMedia,
    NotFound,
    Conflict,
    Busy,
    ProviderUnavailable,
    RateLimited,
    Timeout,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidMedia => "invalid_media",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Busy => "busy",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl Error {
    /// Classify this error into its wire-level kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::Serialization(_) | Error::DimensionMismatch { .. } => {
                ErrorKind::InvalidInput
            }
            Error::InvalidMedia(_) => ErrorKind::InvalidMedia,
            Error::NotFound(_) | Error::RecordingNotFound(_) | Error::DocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Busy(_) => ErrorKind::Busy,
            Error::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Database(_) | Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code an external wire layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidMedia => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Busy | ErrorKind::RateLimited => 429,
            ErrorKind::ProviderUnavailable | ErrorKind::Timeout => 503,
            ErrorKind::Cancelled | ErrorKind::Internal => 500,
        }
    }

    /// Whether the orchestrator should keep this failure kind verbatim on the
    /// record, rather than collapsing it to `Internal`.
    pub fn is_classified_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidMedia
                | ErrorKind::ProviderUnavailable
                | ErrorKind::Timeout
                | ErrorKind::Cancelled
        )
    }
}

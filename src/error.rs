//! Error types for docgate
//!
//! A single `thiserror` enum carries every failure the service can surface.
//! Callers branch on [`Error::kind`] rather than on the variant itself, and the
//! HTTP layer renders the same `{kind, message, status, details}` shape for
//! every API route.
//!
//! Re-invoking `confirm` or `finalize` on an already advanced fulfillment is
//! not an error; it is reported through the coordinator's outcome types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The main error type for docgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Webhook signature did not verify (or the timestamp is outside tolerance)
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// The processor answered but rejected the request
    #[error("Processor error {status}: {message}")]
    Processor {
        /// HTTP status the processor returned
        status: u16,
        /// Message extracted from the processor's error body
        message: String,
    },

    /// The processor could not be reached (network failure, timeout)
    #[error("Processor unavailable: {0}")]
    ProcessorUnavailable(String),

    /// Missing or wrong credentials on a protected route
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Missing document or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body exceeds the configured limit
    #[error("Payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable, serialisable tag for an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input
    Validation,
    /// Webhook signature missing, wrong or stale
    SignatureInvalid,
    /// Missing or wrong upload token
    Unauthorized,
    /// Processor answered with an error
    Processor,
    /// Processor could not be reached
    ProcessorUnavailable,
    /// Resource does not exist
    NotFound,
    /// Body over the configured limit
    PayloadTooLarge,
    /// Store read or write failed
    Storage,
    /// Bad configuration
    Config,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::SignatureInvalid => "signature_invalid",
            Self::Unauthorized => "unauthorized",
            Self::Processor => "processor",
            Self::ProcessorUnavailable => "processor_unavailable",
            Self::NotFound => "not_found",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

/// Result type alias for docgate operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error from a string
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a not-found error from a string
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a storage error from a string
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// The kind tag used for propagation decisions and error bodies
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Processor { .. } => ErrorKind::Processor,
            Error::ProcessorUnavailable(_) => ErrorKind::ProcessorUnavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Error::Storage(_) | Error::Io(_) => ErrorKind::Storage,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status the error maps to when it reaches a caller
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::SignatureInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Processor => StatusCode::BAD_GATEWAY,
            ErrorKind::ProcessorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Storage | ErrorKind::Config | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Structured details attached to the error body, if any
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Processor { status, .. } => {
                Some(serde_json::json!({ "processor_status": status }))
            }
            Error::PayloadTooLarge { size, limit } => {
                Some(serde_json::json!({ "size": size, "limit": limit }))
            }
            _ => None,
        }
    }

    /// True for failures of the processor round trip
    pub fn is_processor_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Processor | ErrorKind::ProcessorUnavailable
        )
    }

    /// Build the serialisable body for API responses
    pub fn to_body(&self) -> ErrorBody {
        let status = self.status_code();
        // Internal failures never echo their cause to the caller
        let message = if status.is_server_error() && !self.is_processor_failure() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        ErrorBody {
            kind: self.kind(),
            message,
            status: status.as_u16(),
            details: self.details(),
        }
    }
}

/// JSON error body rendered by API routes
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Error kind tag
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// HTTP status code
    pub status: u16,
    /// Optional structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = self.to_body();
        if self.status_code().is_server_error() {
            tracing::error!(kind = self.kind().as_str(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind().as_str(), error = %self, "request rejected");
        }
        (self.status_code(), Json(ErrorEnvelope { error: body })).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Error::Processor {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Error::Processor {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("malformed processor response: {err}"),
            }
        } else {
            Error::ProcessorUnavailable(err.to_string())
        }
    }
}

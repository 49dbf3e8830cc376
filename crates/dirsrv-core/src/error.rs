//! Error types for directory object operations.
//!
//! Protocol failures carry the [`RequestContext`] that produced them. Caller contract violations
//! ([`Error::ValueError`]) and session state failures ([`Error::InvalidState`]) are kept apart from
//! server-side results so callers can tell "you asked for something impossible" from "the server
//! said no".

use crate::request::RequestContext;
use serde::Serialize;
use thiserror::Error;

/// Main error type for directory object operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The target entry (or search base) does not exist
    #[error("No such object: {message} ({request})")]
    NoSuchObject {
        /// Server or local diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// An entry already exists at the target DN
    #[error("Already exists: {message} ({request})")]
    AlreadyExists {
        /// Server or local diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// Schema or policy violation, or an ambiguous lookup
    #[error("Unwilling to perform: {message} ({request})")]
    UnwillingToPerform {
        /// Server or local diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// Bind rejected
    #[error("Invalid credentials: {message} ({request})")]
    InvalidCredentials {
        /// Server diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// Attribute constraint violated
    #[error("Constraint violation: {message} ({request})")]
    ConstraintViolation {
        /// Server diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// Any other protocol failure
    #[error("Protocol error (result code {code}): {message} ({request})")]
    ProtocolError {
        /// Result code, 0 when the failure happened below the protocol (transport)
        code: u32,
        /// Server or transport diagnostic
        message: String,
        /// Originating request
        request: RequestContext,
    },

    /// Session is not connected
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller contract violation
    #[error("Value error: {0}")]
    ValueError(String),

    /// Operation not supported on this object
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Transport-level timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to render a structured projection
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Specialized result type for directory object operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for CLI and automation callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Originating request, when the error came from a protocol round trip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContext>,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoSuchObject { .. } => "NO_SUCH_OBJECT",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::UnwillingToPerform { .. } => "UNWILLING_TO_PERFORM",
            Self::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            Self::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            Self::ProtocolError { .. } => "PROTOCOL_ERROR",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::ValueError(_) => "VALUE_ERROR",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns the originating request for protocol errors.
    #[must_use]
    pub fn request(&self) -> Option<&RequestContext> {
        match self {
            Self::NoSuchObject { request, .. }
            | Self::AlreadyExists { request, .. }
            | Self::UnwillingToPerform { request, .. }
            | Self::InvalidCredentials { request, .. }
            | Self::ConstraintViolation { request, .. }
            | Self::ProtocolError { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Returns true for [`Error::NoSuchObject`].
    #[must_use]
    pub const fn is_no_such_object(&self) -> bool {
        matches!(self, Self::NoSuchObject { .. })
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                request: self.request().cloned(),
            },
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::ConfigError(_)
                | Self::ProtocolError { .. }
                | Self::Timeout(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when calling a metrics provider.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The provider rejected or failed a request.
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    /// Rate limit exceeded.
    #[error("{operation} throttled: {message}")]
    Throttled {
        operation: &'static str,
        message: String,
    },

    /// Authentication or authorization failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The scrape was cancelled before the provider answered.
    #[error("Request cancelled")]
    Cancelled,
}

impl AdapterError {
    /// Check if this error is a cancellation rather than a provider failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AdapterError::Cancelled)
    }

    /// Check if this is a rate limit error.
    pub fn is_throttled(&self) -> bool {
        matches!(self, AdapterError::Throttled { .. })
    }
}

/// Known provider error codes for throttling
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Known provider error codes for credential problems
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
];

/// Classify a provider error using its error code.
pub fn classify(operation: &'static str, code: Option<&str>, message: Option<&str>) -> AdapterError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if THROTTLING_CODES.contains(&c) => AdapterError::Throttled { operation, message },
        Some(c) if AUTH_CODES.contains(&c) => AdapterError::Auth(format!("{}: {}", c, message)),
        _ => AdapterError::Request {
            operation,
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

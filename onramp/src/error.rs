//! Pipeline error types
//!
//! One taxonomy for every stage of repository ingestion and plan synthesis.
//! Transports render errors through [`StructuredError`] so callers get a
//! stable machine-readable code alongside the message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type OnrampResult<T> = Result<T, OnrampError>;

/// Structured error response returned to transport clients.
///
/// ```json
/// {
///   "code": "INVALID_REFERENCE",
///   "message": "Invalid repository reference: ftp://example.com/x",
///   "retryable": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code (e.g., "NOT_FOUND", "FORBIDDEN")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Whether the same request may succeed later
    #[serde(default)]
    pub retryable: bool,
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

/// Errors that can occur while ingesting repositories or building plans
#[derive(Error, Debug)]
pub enum OnrampError {
    /// Repository or issue reference failed validation
    #[error("Invalid reference: {reference}")]
    InvalidReference { reference: String },

    /// Shallow fetch failed; the working area was already removed
    #[error("Failed to acquire {reference}: {message}")]
    Acquisition { reference: String, message: String },

    /// Requested path resolves outside the repository root
    #[error("File path is outside the repository bounds")]
    PathEscape { path: String },

    /// Missing file or repository that has not been analyzed
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Generation backend unreachable, timed out, or answered with an error
    #[error("Generation backend unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Issue tracker returned not-found or an API error
    #[error("Could not fetch issue details: {message}")]
    IssueLookup { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OnrampError {
    /// Create an invalid reference error
    pub fn invalid_reference(reference: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
        }
    }

    /// Create an acquisition error
    pub fn acquisition(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Acquisition {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a path escape error
    pub fn path_escape(path: impl Into<String>) -> Self {
        Self::PathEscape { path: path.into() }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an upstream unavailable error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Create an issue lookup error
    pub fn issue_lookup(message: impl Into<String>) -> Self {
        Self::IssueLookup {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Machine-readable code for transports
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidReference { .. } => "INVALID_REFERENCE",
            Self::Acquisition { .. } => "ACQUISITION_FAILED",
            Self::PathEscape { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::IssueLookup { .. } => "ISSUE_LOOKUP_FAILED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this error is retryable (transient failure)
    ///
    /// Nothing retries automatically; this only tells the caller whether
    /// resubmitting the same request can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Network, rate limits, a busy remote
            Self::Acquisition { .. } => true,
            Self::UpstreamUnavailable { .. } => true,
            // Client mistakes and security rejections never succeed on retry
            Self::InvalidReference { .. } | Self::PathEscape { .. } => false,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Convert to the transport representation
    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }

    /// Render as pretty JSON for MCP tool results
    pub fn to_structured_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_structured())
            .unwrap_or_else(|_| format!(r#"{{"code":"{}","message":"{}"}}"#, self.code(), self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_escape_message_does_not_echo_path() {
        let err = OnrampError::path_escape("../../etc/passwd");
        assert!(!err.to_string().contains("passwd"));
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(OnrampError::acquisition("r", "network unreachable").is_retryable());
        assert!(OnrampError::upstream("timeout").is_retryable());
        assert!(!OnrampError::invalid_reference("nope").is_retryable());
        assert!(!OnrampError::path_escape("..").is_retryable());
        assert!(!OnrampError::not_found("x").is_retryable());
        assert!(!OnrampError::issue_lookup("Not Found").is_retryable());
    }

    #[test]
    fn test_structured_json_shape() {
        let err = OnrampError::upstream("connection refused");
        let json: serde_json::Value =
            serde_json::from_str(&err.to_structured_json()).expect("valid json");
        assert_eq!(json["code"], "UPSTREAM_UNAVAILABLE");
        assert_eq!(json["retryable"], true);
        assert!(json["message"]
            .as_str()
            .unwrap_or_default()
            .contains("connection refused"));
    }
}

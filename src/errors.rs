//! Centralized error handling
//!
//! Every failure carries a unique code so log lines can be grepped and
//! alerted on without parsing free-form messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - EVT_xxx: event stream / decode errors
//! - CACHE_xxx: state store lookups
//! - HTTP_xxx: outbound request errors
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Event stream errors
    // ============================================
    /// Malformed event payload; the owning stream task must not continue
    EventDecode,
    /// Event kind or subscriber operation outside the known set
    UnknownDiscriminant,
    /// Stream transport failure (reconnectable)
    StreamTransport,
    /// Stream source is closed and will produce no more frames
    StreamClosed,

    // ============================================
    // State store errors
    // ============================================
    /// Requested identity/record is not in the cache
    NotFound,
    /// Service statistics requested for a family that keeps none
    UnknownFamily,

    // ============================================
    // Outbound HTTP errors
    // ============================================
    /// Network-level send failure
    Transport,
    /// Peer answered with a non-success status
    UnsuccessfulStatus,
    /// Request body cannot be buffered for re-sends
    UnclonableBody,
    /// Shutdown signal observed between retry attempts
    Cancelled,

    // ============================================
    // Configuration errors
    // ============================================
    /// Invalid configuration value
    InvalidConfig,
    /// Metrics registry setup failed; fatal at startup
    MetricsInit,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventDecode => "EVT_DECODE",
            Self::UnknownDiscriminant => "EVT_UNKNOWN_DISCRIMINANT",
            Self::StreamTransport => "EVT_STREAM_TRANSPORT",
            Self::StreamClosed => "EVT_STREAM_CLOSED",

            Self::NotFound => "CACHE_NOT_FOUND",
            Self::UnknownFamily => "CACHE_UNKNOWN_FAMILY",

            Self::Transport => "HTTP_TRANSPORT",
            Self::UnsuccessfulStatus => "HTTP_BAD_STATUS",
            Self::UnclonableBody => "HTTP_UNCLONABLE_BODY",
            Self::Cancelled => "HTTP_CANCELLED",

            Self::InvalidConfig => "CFG_INVALID_VALUE",
            Self::MetricsInit => "MET_REGISTER_FAILED",
        }
    }

    /// Whether the backoff send path should keep retrying after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::UnsuccessfulStatus)
    }

    /// Whether the owning stream task must terminate on this error
    pub fn is_stream_fatal(&self) -> bool {
        matches!(
            self,
            Self::EventDecode | Self::UnknownDiscriminant | Self::StreamClosed
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    pub fn unknown_family(family: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::UnknownFamily,
            format!("no statistics kept for nf family [{}]", family),
        )
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::EventDecode, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, msg)
    }

    pub fn bad_status(status: reqwest::StatusCode) -> Self {
        Self::new(
            ErrorCode::UnsuccessfulStatus,
            format!("error response: {}", status),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "shutdown observed between attempts")
    }
}

// ============================================
// Result type alias
// ============================================

pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::Transport, "request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::Transport, "connection failed")
        } else {
            Self::with_source(ErrorCode::Transport, "request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::EventDecode, "json decode error", err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::StreamTransport, "io error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::not_found("subscriber with key [001] not found");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.code_str(), "CACHE_NOT_FOUND");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::Transport.is_retryable());
        assert!(ErrorCode::UnsuccessfulStatus.is_retryable());
        assert!(!ErrorCode::NotFound.is_retryable());
        assert!(!ErrorCode::Cancelled.is_retryable());
    }

    #[test]
    fn test_stream_fatal() {
        assert!(ErrorCode::EventDecode.is_stream_fatal());
        assert!(!ErrorCode::StreamTransport.is_stream_fatal());
    }

    #[test]
    fn test_display_includes_code() {
        let err = AppError::decode("unknown event type [9]");
        assert!(err.to_string().contains("EVT_DECODE"));
    }
}

//! Error types shared across the timeline engine.
//!
//! Every error carries a numeric code plus a human-readable message so the
//! host UI can decide how (or whether) to present it.

use thiserror::Error;

/// Numeric error codes reported alongside [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NetworkFailure = 100,
    BadResponse = 107,
    InvalidArgument = 108,
}

/// Errors produced by the engine or propagated from the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Caller supplied something unusable (e.g. no active conversation).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service answered, but with a missing or malformed payload.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// Transport failure, description passed through verbatim.
    #[error("network error: {0}")]
    Network(String),
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::BadResponse(_) => ErrorCode::BadResponse,
            Self::Network(_) => ErrorCode::NetworkFailure,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m) | Self::BadResponse(m) | Self::Network(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ChatError::InvalidArgument("x".into()).code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(ChatError::BadResponse("x".into()).code() as u16, 107);
        assert_eq!(ChatError::Network("x".into()).code() as u16, 100);
    }

    #[test]
    fn test_error_display_and_message() {
        let err = ChatError::Network("connection reset".to_string());
        assert_eq!(err.to_string(), "network error: connection reset");
        assert_eq!(err.message(), "connection reset");
    }
}

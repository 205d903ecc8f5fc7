//! Error types for the HTTP handler.
//!
//! Errors fall into two groups:
//!
//! | Group | Variants | What the caller does |
//! |-------|----------|----------------------|
//! | Fatal framing | `MalformedStatusLine`, `MalformedHeader`, `MalformedChunk`, `LimitExceeded`, `Truncated` | Treat the connection as unreliable and close it |
//! | Recoverable | `Encoding`, `Decoding`, `QueueFull`, `NotReady` | Fix the request, accept the raw body, or retry later |
//!
//! `Channel`, `Config` and `Io` report failures of the collaborators around the
//! handler rather than of the handler itself.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, HandlerError>;

/// Errors produced while encoding requests or decoding responses.
///
/// The type is `Clone` so a decoder can latch a fatal failure and return it
/// again on every later call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Outbound request rejected before transmission
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Status line could not be split into version, code and reason
    #[error("Malformed status line: {0}")]
    MalformedStatusLine(String),

    /// Header line without a colon, or an unusable framing header
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Invalid chunk-size line or chunk data not followed by a line break
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// A decoder limit was exceeded
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Body decompression failed; the response framing is still intact
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Pending-request queue is at capacity
    #[error("Request queue is full ({0} requests awaiting responses)")]
    QueueFull(usize),

    /// The session manager is not ready to send
    #[error("Session is not ready to send")]
    NotReady,

    /// Input ended in the middle of a response
    #[error("Stream ended with an incomplete response ({0} bytes buffered)")]
    Truncated(usize),

    /// The connection collaborator failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// Settings could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error from an async reader
    #[error("IO error: {0}")]
    Io(String),
}

impl HandlerError {
    /// Framing corruption: the byte stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HandlerError::MalformedStatusLine(_)
                | HandlerError::MalformedHeader(_)
                | HandlerError::MalformedChunk(_)
                | HandlerError::LimitExceeded(_)
                | HandlerError::Truncated(_)
        )
    }

    /// Errors the application can handle without dropping the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HandlerError::Encoding(_)
                | HandlerError::Decoding(_)
                | HandlerError::QueueFull(_)
                | HandlerError::NotReady
        )
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Config(err.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_errors_are_fatal() {
        assert!(HandlerError::MalformedStatusLine("x".into()).is_fatal());
        assert!(HandlerError::MalformedHeader("x".into()).is_fatal());
        assert!(HandlerError::Truncated(3).is_fatal());
        assert!(!HandlerError::MalformedHeader("x".into()).is_recoverable());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(HandlerError::Decoding("bad gzip".into()).is_recoverable());
        assert!(HandlerError::Encoding("empty method".into()).is_recoverable());
        assert!(!HandlerError::Decoding("bad gzip".into()).is_fatal());
        assert!(HandlerError::NotReady.is_recoverable());
        assert!(!HandlerError::Channel("closed".into()).is_recoverable());
    }

    #[test]
    fn test_json_error_converts_to_config() {
        let err: HandlerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, HandlerError::Config(_)));
    }
}

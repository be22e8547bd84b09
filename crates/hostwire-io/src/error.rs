//! Error types for streams and single-use resources.

use thiserror::Error;

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Contextual information about the last failed operation on a stream.
///
/// The message is a human-readable diagnostic. Its wording depends on the
/// transport behind the stream and may change between hosts, so callers
/// should display it rather than parse it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct IoError {
    message: String,
}

impl IoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns a string suitable for helping humans debug this error.
    pub fn to_debug_string(&self) -> String {
        self.message.clone()
    }
}

impl From<String> for IoError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for IoError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// An error for input-stream and output-stream operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The last operation (a read, write or flush) failed, or a failure was
    /// discovered after the fact.
    #[error("last operation failed: {0}")]
    LastOperationFailed(IoError),

    /// The stream is closed: the peer is gone and no more operations will
    /// succeed.
    #[error("stream closed")]
    Closed,
}

impl StreamError {
    /// Shorthand for a `LastOperationFailed` carrying `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::LastOperationFailed(IoError::new(message))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, StreamError::Closed)
    }
}

/// Misuse of a single-use resource that the caller can recover from.
///
/// Every "consume at most once" resource enforces `unconsumed → consumed`;
/// a second attempt is reported through this type rather than silently
/// reusing the resource. The payload names the resource involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("{0} was already consumed")]
    AlreadyConsumed(&'static str),

    #[error("child of {0} was already given out")]
    AlreadyGiven(&'static str),

    #[error("value of {0} was already retrieved")]
    AlreadyRetrieved(&'static str),

    #[error("{0} was already set")]
    AlreadySet(&'static str),
}

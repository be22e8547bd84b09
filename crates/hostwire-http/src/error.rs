//! HTTP error types.

use hostwire_io::{ResourceError, StreamError};
use thiserror::Error;

/// Terminal error of an HTTP exchange.
///
/// Carried by a `ResponseOutparam` in place of a response, by a
/// `FutureIncomingResponse` when the transport fails, and by trailers of a
/// body that was not finished. Each variant holds a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timed out: {0}")]
    TimeoutError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("unexpected error: {0}")]
    UnexpectedError(String),
}

/// Rejected header mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// The name is not an HTTP token, or the value holds control bytes.
    #[error("invalid header syntax")]
    InvalidSyntax,

    /// The name is a hop-by-hop header managed by the transport.
    #[error("forbidden header")]
    Forbidden,
}

impl From<HeaderError> for ErrorCode {
    fn from(err: HeaderError) -> Self {
        ErrorCode::UnexpectedError(err.to_string())
    }
}

/// Failure while draining a body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use hostwire_io::ResourceError;

use crate::body::{BodySlot, IncomingBody, OutgoingBody};
use crate::error::ErrorCode;
use crate::fields::Fields;

/// A response as seen by the client.
pub struct IncomingResponse {
    status: u16,
    headers: Fields,
    body: Option<IncomingBody>,
}

impl IncomingResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// An independent copy of the response headers.
    pub fn headers(&self) -> Fields {
        self.headers.clone()
    }

    /// Take the response body. Succeeds once.
    pub fn consume(&mut self) -> Result<IncomingBody, ResourceError> {
        self.body
            .take()
            .ok_or(ResourceError::AlreadyConsumed("incoming-response"))
    }
}

impl fmt::Debug for IncomingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .field("consumed", &self.body.is_none())
            .finish()
    }
}

/// A response built by a handler and handed over through a
/// `ResponseOutparam`.
///
/// The body may still be written after the response is handed over: take
/// it with [`write`](Self::write) first, set the outparam, then stream and
/// finish the body.
pub struct OutgoingResponse {
    status: u16,
    headers: Fields,
    body: BodySlot,
}

impl OutgoingResponse {
    /// A response with `status` and `headers`.
    ///
    /// `status` is not validated here; use
    /// [`set_status_code`](Self::set_status_code) for checked updates.
    pub fn new(status: u16, headers: Fields) -> Self {
        Self {
            status,
            headers,
            body: BodySlot::new("outgoing-response"),
        }
    }

    /// Bytes the body buffers before its writer is backpressured. Only
    /// effective before [`write`](Self::write); a size of 0 is treated as 1.
    pub fn with_body_buffer_size(mut self, size: usize) -> Self {
        self.body.set_capacity(size);
        self
    }

    /// Make `contents` the complete body, already finished.
    pub(crate) fn fill_body(&mut self, contents: Bytes) -> Result<(), ResourceError> {
        self.body.fill(contents)
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Set the status, rejecting codes outside `100..=599`.
    pub fn set_status_code(&mut self, status: u16) -> Result<(), ErrorCode> {
        if !(100..=599).contains(&status) {
            return Err(ErrorCode::UnexpectedError(format!(
                "invalid status code {status}"
            )));
        }
        self.status = status;
        Ok(())
    }

    pub fn headers(&self) -> &Fields {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Fields {
        &mut self.headers
    }

    /// The response body. Available exactly once.
    pub fn write(&mut self) -> Result<OutgoingBody, ResourceError> {
        self.body.write()
    }

    /// Host side: turn this response into the form the client receives.
    ///
    /// A body that was never taken becomes an empty, finished body.
    pub fn into_incoming(self) -> IncomingResponse {
        self.into_incoming_with_idle_timeout(None)
    }

    pub(crate) fn into_incoming_with_idle_timeout(self, idle_timeout: Option<Duration>) -> IncomingResponse {
        IncomingResponse {
            status: self.status,
            headers: self.headers,
            body: Some(self.body.into_incoming(idle_timeout)),
        }
    }
}

impl fmt::Debug for OutgoingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

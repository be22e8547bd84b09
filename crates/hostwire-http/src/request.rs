use std::fmt;

use bytes::Bytes;
use hostwire_io::ResourceError;

use crate::body::{BodySlot, IncomingBody, OutgoingBody};
use crate::fields::Fields;
use crate::types::{Method, Scheme};

/// A request received by a handler.
pub struct IncomingRequest {
    method: Method,
    path_with_query: Option<String>,
    scheme: Option<Scheme>,
    authority: Option<String>,
    headers: Fields,
    body: Option<IncomingBody>,
}

impl IncomingRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_with_query(&self) -> Option<&str> {
        self.path_with_query.as_deref()
    }

    pub fn scheme(&self) -> Option<&Scheme> {
        self.scheme.as_ref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// An independent copy of the request headers.
    pub fn headers(&self) -> Fields {
        self.headers.clone()
    }

    /// Take the request body. Succeeds once.
    pub fn consume(&mut self) -> Result<IncomingBody, ResourceError> {
        self.body
            .take()
            .ok_or(ResourceError::AlreadyConsumed("incoming-request"))
    }
}

impl fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("method", &self.method)
            .field("path_with_query", &self.path_with_query)
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("headers", &self.headers.len())
            .finish()
    }
}

/// A request built by a client, to be handed to a transport.
pub struct OutgoingRequest {
    method: Method,
    path_with_query: Option<String>,
    scheme: Option<Scheme>,
    authority: Option<String>,
    headers: Fields,
    body: BodySlot,
}

impl OutgoingRequest {
    pub fn new(
        method: Method,
        path_with_query: Option<&str>,
        scheme: Option<Scheme>,
        authority: Option<&str>,
        headers: Fields,
    ) -> Self {
        Self {
            method,
            path_with_query: path_with_query.map(str::to_string),
            scheme,
            authority: authority.map(str::to_string),
            headers,
            body: BodySlot::new("outgoing-request"),
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

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_with_query(&self) -> Option<&str> {
        self.path_with_query.as_deref()
    }

    pub fn scheme(&self) -> Option<&Scheme> {
        self.scheme.as_ref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn headers(&self) -> &Fields {
        &self.headers
    }

    /// The request body. Available exactly once.
    ///
    /// The request may be sent before the body is finished; the transport
    /// streams it as it is written.
    pub fn write(&mut self) -> Result<OutgoingBody, ResourceError> {
        self.body.write()
    }

    /// Host side: turn this request into the form a handler receives.
    pub fn into_incoming(self) -> IncomingRequest {
        IncomingRequest {
            method: self.method,
            path_with_query: self.path_with_query,
            scheme: self.scheme,
            authority: self.authority,
            headers: self.headers,
            body: Some(self.body.into_incoming(None)),
        }
    }
}

impl fmt::Debug for OutgoingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingRequest")
            .field("method", &self.method)
            .field("path_with_query", &self.path_with_query)
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

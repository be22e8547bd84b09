//! Convenience constructors for outgoing responses.

use bytes::Bytes;

use crate::body::OutgoingBody;
use crate::error::ErrorCode;
use crate::fields::Fields;
use crate::response::OutgoingResponse;

/// Builds an [`OutgoingResponse`] with its status, headers and body.
///
/// ```ignore
/// let response = ResponseBuilder::new()
///     .with_status_code(201)
///     .with_header("Content-Type", "text/plain")?
///     .text("created")?;
/// outparam.set(Ok(response))?;
/// ```
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status_code: u16,
    headers: Fields,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: Fields::new(),
        }
    }

    /// Set the status. Validated when the response is built.
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, ErrorCode> {
        self.with_binary_header(name, value.as_ref().as_bytes())
    }

    /// Set `name` to the single value `value`, replacing earlier values.
    pub fn with_binary_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<[u8]>,
    ) -> Result<Self, ErrorCode> {
        self.headers
            .set(name.as_ref(), [value.as_ref().to_vec()])?;
        Ok(self)
    }

    /// A response with an empty, already finished body.
    pub fn empty(self) -> Result<OutgoingResponse, ErrorCode> {
        self.response()
    }

    pub fn text(self, body: impl AsRef<str>) -> Result<OutgoingResponse, ErrorCode> {
        self.binary(Bytes::copy_from_slice(body.as_ref().as_bytes()))
    }

    /// A response whose body is `body`, fully written and finished.
    pub fn binary(self, body: impl Into<Bytes>) -> Result<OutgoingResponse, ErrorCode> {
        let body: Bytes = body.into();
        let mut response = self.response()?.with_body_buffer_size(body.len().max(1));
        let mut outgoing = response.write().map_err(unexpected)?;

        let mut stream = outgoing.write().map_err(unexpected)?;
        // The buffer was sized to the body, so the first permit covers it.
        let permit = stream.check_write().map_err(unexpected)?;
        debug_assert!(permit >= body.len());
        stream.write(body).map_err(unexpected)?;
        drop(stream);

        outgoing.finish(None);
        Ok(response)
    }

    /// A response plus its body, for the caller to stream and finish.
    pub fn streaming(self) -> Result<(OutgoingResponse, OutgoingBody), ErrorCode> {
        let mut response = self.response()?;
        let body = response.write().map_err(unexpected)?;
        Ok((response, body))
    }

    fn response(self) -> Result<OutgoingResponse, ErrorCode> {
        let mut response = OutgoingResponse::new(200, self.headers);
        response.set_status_code(self.status_code)?;
        Ok(response)
    }
}

fn unexpected(err: impl std::fmt::Display) -> ErrorCode {
    ErrorCode::UnexpectedError(err.to_string())
}

/// 307 Temporary Redirect with no header other than `Location`.
pub fn temporary_redirect(location: &str) -> Result<OutgoingResponse, ErrorCode> {
    ResponseBuilder::new()
        .with_status_code(307)
        .with_header("Location", location)?
        .empty()
}

/// 403 Forbidden with no body.
pub fn forbidden() -> OutgoingResponse {
    OutgoingResponse::new(403, Fields::new())
}

/// 500 Internal Server Error with no body.
pub fn internal_server_error() -> OutgoingResponse {
    OutgoingResponse::new(500, Fields::new())
}

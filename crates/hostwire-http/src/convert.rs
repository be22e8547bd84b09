//! Conversions between hostwire messages and the `http` crate's types.
//!
//! Request heads map onto `http::Request<Bytes>` and responses onto
//! `http::Response<Bytes>`. Bodies are buffered whole: converting a
//! response into `http` drains its body and waits for its trailers.

use bytes::Bytes;
use http::uri::Scheme as HttpScheme;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::{BodyError, ErrorCode};
use crate::fields::Fields;
use crate::request::OutgoingRequest;
use crate::response::{IncomingResponse, OutgoingResponse};
use crate::types::{Method, Scheme};

impl From<&http::Method> for Method {
    fn from(method: &http::Method) -> Self {
        match *method {
            http::Method::GET => Method::Get,
            http::Method::HEAD => Method::Head,
            http::Method::POST => Method::Post,
            http::Method::PUT => Method::Put,
            http::Method::DELETE => Method::Delete,
            http::Method::CONNECT => Method::Connect,
            http::Method::OPTIONS => Method::Options,
            http::Method::TRACE => Method::Trace,
            http::Method::PATCH => Method::Patch,
            _ => Method::Other(method.as_str().to_string()),
        }
    }
}

impl TryFrom<&Method> for http::Method {
    type Error = ErrorCode;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        http::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|err| ErrorCode::ProtocolError(format!("invalid method {method}: {err}")))
    }
}

impl From<&HttpScheme> for Scheme {
    fn from(scheme: &HttpScheme) -> Self {
        let Ok(scheme) = scheme.as_str().parse::<Scheme>();
        scheme
    }
}

impl TryFrom<&Scheme> for HttpScheme {
    type Error = ErrorCode;

    fn try_from(scheme: &Scheme) -> Result<Self, Self::Error> {
        match scheme {
            Scheme::Http => Ok(HttpScheme::HTTP),
            Scheme::Https => Ok(HttpScheme::HTTPS),
            Scheme::Other(other) => other
                .parse()
                .map_err(|err| ErrorCode::InvalidUrl(format!("invalid scheme {other:?}: {err}"))),
        }
    }
}

/// Copy every entry of `headers`, duplicates included and in order.
///
/// Hop-by-hop headers belong to the transport and are left out.
pub fn fields_from_header_map(headers: &HeaderMap) -> Fields {
    let mut fields = Fields::new();
    for (name, value) in headers {
        if let Err(err) = fields.append(name.as_str(), value.as_bytes()) {
            tracing::debug!(header = %name, error = %err, "header not carried over");
        }
    }
    fields
}

/// Copy every entry of `fields` into a `HeaderMap`, duplicates included.
pub fn header_map_from_fields(fields: &Fields) -> Result<HeaderMap, ErrorCode> {
    let mut headers = HeaderMap::with_capacity(fields.len());
    for (name, value) in fields.entries() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ErrorCode::ProtocolError(format!("invalid header name {name:?}: {err}")))?;
        let value = HeaderValue::from_bytes(value)
            .map_err(|err| ErrorCode::ProtocolError(format!("invalid value for header {name}: {err}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

impl From<http::Request<Bytes>> for OutgoingRequest {
    /// The body, if non-empty, becomes the request's complete body.
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let mut outgoing = OutgoingRequest::new(
            Method::from(&parts.method),
            parts.uri.path_and_query().map(|pq| pq.as_str()),
            parts.uri.scheme().map(Scheme::from),
            parts.uri.authority().map(|authority| authority.as_str()),
            fields_from_header_map(&parts.headers),
        );
        if !body.is_empty() {
            // A freshly built request has no body yet, so filling cannot fail.
            let _ = outgoing.fill_body(body);
        }
        outgoing
    }
}

impl From<http::Response<Bytes>> for OutgoingResponse {
    fn from(response: http::Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        let mut outgoing = OutgoingResponse::new(
            parts.status.as_u16(),
            fields_from_header_map(&parts.headers),
        );
        if !body.is_empty() {
            let _ = outgoing.fill_body(body);
        }
        outgoing
    }
}

/// Drain `response` into an `http::Response`.
///
/// Fails if the body cannot be read to its end or its trailers resolve to
/// an error. Trailer fields themselves are not carried over.
pub async fn into_http_response(mut response: IncomingResponse) -> Result<http::Response<Bytes>, ErrorCode> {
    let status = StatusCode::from_u16(response.status())
        .map_err(|err| ErrorCode::ProtocolError(format!("invalid status {}: {err}", response.status())))?;
    let headers = header_map_from_fields(&response.headers())?;

    let mut body = response.consume().map_err(|err| ErrorCode::UnexpectedError(err.to_string()))?;
    let bytes = body.read_to_end().await.map_err(body_error)?;
    match body.finish().wait().await {
        Ok(Ok(_trailers)) => {}
        Ok(Err(code)) => return Err(code),
        Err(err) => return Err(ErrorCode::UnexpectedError(err.to_string())),
    }

    let mut converted = http::Response::new(bytes);
    *converted.status_mut() = status;
    *converted.headers_mut() = headers;
    Ok(converted)
}

fn body_error(err: BodyError) -> ErrorCode {
    match err {
        BodyError::Stream(err) => ErrorCode::ProtocolError(format!("response body failed: {err}")),
        BodyError::Resource(err) => ErrorCode::UnexpectedError(err.to_string()),
    }
}

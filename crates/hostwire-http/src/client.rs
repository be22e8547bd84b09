//! Client path: transports and the response future.

use hostwire_io::future::{self, HostFuture, Promise};
use hostwire_io::{Pollable, ResourceError};

use crate::error::ErrorCode;
use crate::request::OutgoingRequest;
use crate::response::IncomingResponse;
use crate::types::RequestOptions;

type ResponseResult = Result<IncomingResponse, ErrorCode>;

fn transport_gone() -> ResponseResult {
    Err(ErrorCode::UnexpectedError(
        "transport dropped the request without a response".to_string(),
    ))
}

/// Something that carries an outgoing request to a peer and yields the
/// peer's response.
///
/// `send` returns promptly. The exchange proceeds in the background and
/// resolves the returned future; the request body may be written while it
/// runs.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: OutgoingRequest,
        options: Option<RequestOptions>,
    ) -> Result<FutureIncomingResponse, ErrorCode>;
}

/// Send `request` and wait for the response head.
pub async fn send<T>(
    transport: &T,
    request: OutgoingRequest,
    options: Option<RequestOptions>,
) -> Result<IncomingResponse, ErrorCode>
where
    T: Transport + ?Sized,
{
    let future = transport.send(request, options)?;
    future
        .wait()
        .await
        .map_err(|err| ErrorCode::UnexpectedError(err.to_string()))?
}

/// A response that may not have arrived yet.
#[derive(Debug)]
pub struct FutureIncomingResponse {
    inner: HostFuture<ResponseResult>,
}

impl FutureIncomingResponse {
    /// A pending future plus the promise a transport resolves it with.
    ///
    /// Dropping the promise unresolved resolves the future with
    /// `UnexpectedError`.
    pub fn pending() -> (Promise<ResponseResult>, Self) {
        let (promise, inner) = future::channel("future-incoming-response", transport_gone);
        (promise, Self { inner })
    }

    /// A future that is already resolved with `result`.
    pub fn ready(result: ResponseResult) -> Self {
        let (promise, future) = Self::pending();
        promise.resolve(result);
        future
    }

    /// A pollable ready once the response (or an error) is available.
    pub fn subscribe(&self) -> Pollable {
        self.inner.subscribe()
    }

    /// `None` while pending, `Some(Ok(result))` exactly once, then
    /// `Some(Err(AlreadyRetrieved))`.
    pub fn get(&self) -> Option<Result<ResponseResult, ResourceError>> {
        self.inner.get()
    }

    pub async fn wait(&self) -> Result<ResponseResult, ResourceError> {
        self.inner.wait().await
    }
}

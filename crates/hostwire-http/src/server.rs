//! Server path: the handler contract and dispatch.
//!
//! A handler receives an [`IncomingRequest`] and a [`ResponseOutparam`] and
//! returns nothing. The response travels through the outparam; its body may
//! keep streaming after the handler has set it. [`dispatch`] is the caller
//! side: it runs the handler in its own task and turns protocol violations
//! (outparam never set, handler panic) into a generic 500 instead of a hang.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::builder::internal_server_error;
use crate::error::ErrorCode;
use crate::outparam::{self, HandlerResult, OutparamReceiver, ResponseOutparam};
use crate::request::IncomingRequest;
use crate::response::IncomingResponse;

/// Future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Entry point for incoming requests.
///
/// Implemented for any `Fn(IncomingRequest, ResponseOutparam) -> impl Future`
/// closure or function.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: IncomingRequest, outparam: ResponseOutparam) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(IncomingRequest, ResponseOutparam) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, request: IncomingRequest, outparam: ResponseOutparam) -> HandlerFuture {
        Box::pin(self(request, outparam))
    }
}

/// Run `handler` on `request` and wait for the response head.
///
/// - outparam set to a response → that response, body streaming on
/// - outparam set to an error → `Err(code)`
/// - outparam never set (handler returned or panicked) → a bodyless 500
///
/// Requires a tokio runtime; without one this returns `UnexpectedError`.
pub async fn dispatch<H>(handler: &H, request: IncomingRequest) -> Result<IncomingResponse, ErrorCode>
where
    H: Handler + ?Sized,
{
    let (receiver, _task) = spawn(handler, request)?;
    resolve(receiver.wait().await, None)
}

/// Start `handler` in its own task.
pub(crate) fn spawn<H>(handler: &H, request: IncomingRequest) -> Result<(OutparamReceiver, JoinHandle<()>), ErrorCode>
where
    H: Handler + ?Sized,
{
    let runtime = Handle::try_current()
        .map_err(|err| ErrorCode::UnexpectedError(format!("no async runtime available: {err}")))?;

    tracing::debug!(
        method = %request.method(),
        path = request.path_with_query().unwrap_or(""),
        "dispatching request"
    );
    let (outparam, receiver) = outparam::channel();
    let task = runtime.spawn(handler.handle(request, outparam));
    Ok((receiver, task))
}

/// Turn what the outparam received into the client-visible result.
pub(crate) fn resolve(
    received: Option<HandlerResult>,
    idle_timeout: Option<Duration>,
) -> Result<IncomingResponse, ErrorCode> {
    match received {
        Some(Ok(response)) => {
            tracing::debug!(status = response.status_code(), "response dispatched");
            Ok(response.into_incoming_with_idle_timeout(idle_timeout))
        }
        Some(Err(code)) => {
            tracing::debug!(error = %code, "handler returned an error");
            Err(code)
        }
        None => {
            tracing::error!("handler finished without setting the response outparam; responding 500");
            Ok(internal_server_error().into_incoming())
        }
    }
}

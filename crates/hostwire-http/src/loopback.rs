//! In-process transport that delivers requests straight to a [`Handler`].
//!
//! Every `send` runs one exchange in the background:
//!
//! 1. wait for a handler slot (bounded by `connect_timeout`),
//! 2. start the handler with the converted request,
//! 3. wait for the outparam (bounded by `first_byte_timeout`),
//! 4. hand back the response; body reads that stall longer than
//!    `between_bytes_timeout` fail the body stream.
//!
//! Expired timeouts surface as [`ErrorCode::TimeoutError`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::client::{FutureIncomingResponse, Transport};
use crate::config::HostConfig;
use crate::error::ErrorCode;
use crate::request::{IncomingRequest, OutgoingRequest};
use crate::response::IncomingResponse;
use crate::server::{self, Handler};
use crate::types::RequestOptions;

/// Transport wiring a client directly to an in-process handler.
pub struct LoopbackTransport {
    handler: Arc<dyn Handler>,
    slots: Arc<Semaphore>,
    defaults: RequestOptions,
}

impl LoopbackTransport {
    pub fn new(handler: impl Handler) -> Self {
        Self::with_config(handler, &HostConfig::default())
    }

    /// Build a transport from `config`. A concurrency limit of 0 is raised
    /// to 1 so that requests always get a slot eventually.
    pub fn with_config(handler: impl Handler, config: &HostConfig) -> Self {
        let slots = config.max_concurrent_requests.max(1);
        if slots != config.max_concurrent_requests {
            tracing::warn!("max_concurrent_requests of 0 raised to 1");
        }
        Self {
            handler: Arc::new(handler),
            slots: Arc::new(Semaphore::new(slots)),
            defaults: config.request,
        }
    }

    /// Handler slots not currently in use.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Transport for LoopbackTransport {
    fn send(
        &self,
        request: OutgoingRequest,
        options: Option<RequestOptions>,
    ) -> Result<FutureIncomingResponse, ErrorCode> {
        validate(&request)?;
        let runtime = Handle::try_current()
            .map_err(|err| ErrorCode::UnexpectedError(format!("no async runtime available: {err}")))?;

        let options = options.unwrap_or_default().or(&self.defaults);
        let exchange = Exchange {
            handler: Arc::clone(&self.handler),
            slots: Arc::clone(&self.slots),
            options,
        };
        let request = request.into_incoming();
        let (promise, future) = FutureIncomingResponse::pending();

        runtime.spawn(async move {
            let result = exchange.run(request).await;
            if let Err(code) = &result {
                tracing::warn!(error = %code, "loopback exchange failed");
            }
            promise.resolve(result);
        });
        Ok(future)
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("available_slots", &self.available_slots())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

struct Exchange {
    handler: Arc<dyn Handler>,
    slots: Arc<Semaphore>,
    options: RequestOptions,
}

impl Exchange {
    async fn run(self, request: IncomingRequest) -> Result<IncomingResponse, ErrorCode> {
        let permit = self.acquire_slot().await?;

        let (receiver, task) = server::spawn(self.handler.as_ref(), request)?;
        // The slot stays taken until the handler task ends, body included.
        tokio::spawn(async move {
            let _ = task.await;
            drop(permit);
        });

        let received = match self.options.first_byte_timeout() {
            Some(limit) => tokio::time::timeout(limit, receiver.wait())
                .await
                .map_err(|_| timeout("first byte", limit))?,
            None => receiver.wait().await,
        };
        server::resolve(received, self.options.between_bytes_timeout())
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, ErrorCode> {
        let slots = Arc::clone(&self.slots);
        let acquired = match self.options.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, slots.acquire_owned())
                .await
                .map_err(|_| timeout("handler slot", limit))?,
            None => slots.acquire_owned().await,
        };
        acquired.map_err(|_| ErrorCode::UnexpectedError("loopback transport shut down".to_string()))
    }
}

fn timeout(what: &str, limit: Duration) -> ErrorCode {
    ErrorCode::TimeoutError(format!("{what} not received within {limit:?}"))
}

fn validate(request: &OutgoingRequest) -> Result<(), ErrorCode> {
    if let Some(path) = request.path_with_query() {
        if !path.starts_with('/') {
            return Err(ErrorCode::InvalidUrl(format!(
                "path {path:?} must start with '/'"
            )));
        }
    }
    if let Some(authority) = request.authority() {
        if authority.is_empty() || authority.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(ErrorCode::InvalidUrl(format!("invalid authority {authority:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Fields;
    use crate::outparam::ResponseOutparam;
    use crate::types::Method;

    async fn ignore(_request: IncomingRequest, _outparam: ResponseOutparam) {}

    fn request(path: Option<&str>, authority: Option<&str>) -> OutgoingRequest {
        OutgoingRequest::new(Method::Get, path, None, authority, Fields::new())
    }

    #[test]
    fn validate_accepts_well_formed_requests() {
        assert!(validate(&request(Some("/a?b=c"), Some("example.com:8080"))).is_ok());
        assert!(validate(&request(None, None)).is_ok());
    }

    #[test]
    fn validate_rejects_relative_path() {
        assert!(matches!(
            validate(&request(Some("relative"), None)),
            Err(ErrorCode::InvalidUrl(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_authority() {
        for authority in ["", "exa mple.com", "example.com/path"] {
            assert!(
                matches!(validate(&request(Some("/"), Some(authority))), Err(ErrorCode::InvalidUrl(_))),
                "authority {authority:?} should be rejected"
            );
        }
    }

    #[test]
    fn send_without_runtime_is_unexpected_error() {
        let transport = LoopbackTransport::new(ignore);
        assert!(matches!(
            transport.send(request(Some("/"), None), None),
            Err(ErrorCode::UnexpectedError(_))
        ));
    }

    #[test]
    fn slots_follow_config() {
        let config = HostConfig::default().with_max_concurrent_requests(3);
        let transport = LoopbackTransport::with_config(ignore, &config);
        assert_eq!(transport.available_slots(), 3);
    }

    #[test]
    fn zero_slots_raised_to_one() {
        let config = HostConfig::default().with_max_concurrent_requests(0);
        let transport = LoopbackTransport::with_config(ignore, &config);
        assert_eq!(transport.available_slots(), 1);
    }
}

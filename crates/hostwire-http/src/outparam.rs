//! The response hand-off between a handler and its caller.

use std::fmt;

use hostwire_io::future::{self, HostFuture, Promise};
use hostwire_io::{Pollable, ResourceError};

use crate::error::ErrorCode;
use crate::response::OutgoingResponse;

/// What a handler hands back: a response or a terminal error.
pub type HandlerResult = Result<OutgoingResponse, ErrorCode>;

/// Create a linked outparam/receiver pair for one handler invocation.
pub fn channel() -> (ResponseOutparam, OutparamReceiver) {
    let (promise, future) = future::channel("response-outparam", never_set);
    (
        ResponseOutparam {
            promise: Some(promise),
        },
        OutparamReceiver { future },
    )
}

fn never_set() -> Option<HandlerResult> {
    None
}

/// Handler side of the hand-off. Must be set exactly once.
pub struct ResponseOutparam {
    promise: Option<Promise<Option<HandlerResult>>>,
}

impl ResponseOutparam {
    /// Hand `result` to the caller.
    ///
    /// The first call wins. A second call is a protocol violation: it is
    /// logged and rejected with `AlreadySet`, and the first result stands.
    pub fn set(&mut self, result: HandlerResult) -> Result<(), ResourceError> {
        let Some(promise) = self.promise.take() else {
            tracing::warn!("response outparam set more than once; keeping the first result");
            return Err(ResourceError::AlreadySet("response-outparam"));
        };
        match &result {
            Ok(response) => tracing::debug!(status = response.status_code(), "response outparam set"),
            Err(code) => tracing::debug!(error = %code, "response outparam set to error"),
        }
        promise.resolve(Some(result));
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.promise.is_none()
    }
}

impl fmt::Debug for ResponseOutparam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseOutparam")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Caller side of the hand-off.
#[derive(Debug)]
pub struct OutparamReceiver {
    future: HostFuture<Option<HandlerResult>>,
}

impl OutparamReceiver {
    /// A pollable ready once the outparam is set or dropped unset.
    pub fn subscribe(&self) -> Pollable {
        self.future.subscribe()
    }

    /// Wait for the handler's result. `None` if the outparam was dropped
    /// without being set.
    pub async fn wait(self) -> Option<HandlerResult> {
        // The receiver is consumed, so the value cannot have been taken yet.
        self.future.wait().await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Fields;

    fn ok(status: u16) -> HandlerResult {
        Ok(OutgoingResponse::new(status, Fields::new()))
    }

    #[tokio::test]
    async fn set_once_is_received() {
        let (mut outparam, receiver) = channel();
        assert!(!outparam.is_set());
        outparam.set(ok(201)).unwrap();
        assert!(outparam.is_set());

        let response = receiver.wait().await.unwrap().unwrap();
        assert_eq!(response.status_code(), 201);
    }

    #[tokio::test]
    async fn second_set_is_rejected_and_first_stands() {
        let (mut outparam, receiver) = channel();
        outparam.set(ok(200)).unwrap();
        assert_eq!(
            outparam.set(ok(500)).unwrap_err(),
            ResourceError::AlreadySet("response-outparam")
        );

        let response = receiver.wait().await.unwrap().unwrap();
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn error_result_passes_through() {
        let (mut outparam, receiver) = channel();
        outparam
            .set(Err(ErrorCode::InvalidUrl("bad".into())))
            .unwrap();
        assert_eq!(
            receiver.wait().await.unwrap().unwrap_err(),
            ErrorCode::InvalidUrl("bad".into())
        );
    }

    #[tokio::test]
    async fn dropped_unset_resolves_none() {
        let (outparam, receiver) = channel();
        let ready = receiver.subscribe();
        assert!(!ready.is_ready());

        drop(outparam);
        assert!(ready.is_ready());
        drop(ready);
        assert!(receiver.wait().await.is_none());
    }
}

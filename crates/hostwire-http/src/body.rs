//! Message bodies and finalization.
//!
//! A body is a byte stream plus trailers delivered after the last byte.
//! [`channel`] links the two ends:
//!
//! ```text
//!  OutgoingBody ── write() ──▶ OutputStream ═══ pipe ═══▶ InputStream ◀── stream() ── IncomingBody
//!       │                                                                                  │
//!   finish(trailers) ───────────────── trailers promise ──────────────────────────▶ finish() → FutureTrailers
//! ```
//!
//! Termination is explicit. `OutgoingBody::finish` ends the stream and
//! resolves the trailers. Dropping an `OutgoingBody` without finishing it
//! marks the body as truncated: the reader drains what was written, then
//! its stream fails and the trailers resolve to
//! [`ErrorCode::ProtocolError`].

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use hostwire_io::future::{self, HostFuture, Promise};
use hostwire_io::{
    ChildTracker, DropPolicy, InputStream, IoError, OutputStream, PipeCloser, PipeReader,
    PipeWriter, Pollable, ResourceError, pipe,
};

use crate::error::{BodyError, ErrorCode};
use crate::fields::Fields;

/// Bytes a body buffers before its writer is backpressured.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

type TrailersResult = Result<Fields, ErrorCode>;

fn unfinished_trailers() -> TrailersResult {
    Err(ErrorCode::ProtocolError(
        "body was dropped before it was finished".to_string(),
    ))
}

/// Create a linked body pair buffering at most `capacity` bytes.
pub fn channel(capacity: usize) -> (OutgoingBody, BodyReceiver) {
    let (mut writer, reader) = pipe(capacity);
    let closer = writer.closer();
    let (promise, trailers) = future::channel("future-trailers", unfinished_trailers);

    let outgoing = OutgoingBody {
        writer: Some(writer),
        closer: Some(closer),
        trailers: Some(promise),
        children: ChildTracker::with_policy("outgoing-body", DropPolicy::Detach),
    };
    let receiver = BodyReceiver { reader, trailers };
    (outgoing, receiver)
}

/// A receiver over `contents` whose writer has already finished.
pub(crate) fn complete(contents: Bytes) -> BodyReceiver {
    let (promise, trailers) = future::channel("future-trailers", unfinished_trailers);
    promise.resolve(Ok(Fields::new()));
    BodyReceiver {
        reader: hostwire_io::pipe::filled(contents),
        trailers,
    }
}

/// Writing end of a body.
pub struct OutgoingBody {
    writer: Option<PipeWriter>,
    /// `None` once finished.
    closer: Option<PipeCloser>,
    trailers: Option<Promise<TrailersResult>>,
    children: ChildTracker,
}

impl OutgoingBody {
    /// The body's output stream. Available exactly once.
    pub fn write(&mut self) -> Result<OutputStream, ResourceError> {
        let writer = self
            .writer
            .take()
            .ok_or(ResourceError::AlreadyGiven("outgoing-body"))?;
        Ok(OutputStream::new(writer).with_parent(self.children.guard()))
    }

    /// End the body, attaching `trailers` (empty if `None`).
    ///
    /// Bytes already accepted by the stream stay readable; the reader sees
    /// them, then the end of the stream, then the trailers.
    ///
    /// # Panics
    ///
    /// If the stream returned by [`write`](Self::write) is still alive.
    pub fn finish(mut self, trailers: Option<Fields>) {
        self.children.assert_no_children();
        self.writer = None;
        if let Some(closer) = self.closer.take() {
            closer.finish();
        }
        if let Some(promise) = self.trailers.take() {
            promise.resolve(Ok(trailers.unwrap_or_default()));
        }
        tracing::debug!("outgoing body finished");
    }
}

impl Drop for OutgoingBody {
    fn drop(&mut self) {
        let Some(closer) = self.closer.take() else {
            return;
        };
        tracing::warn!("outgoing body dropped without finish; reader will see a truncated body");
        closer.fail(IoError::new("outgoing body was dropped before it was finished"));
        // Dropping the promise resolves the trailers with a protocol error.
        self.trailers = None;
    }
}

impl fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingBody")
            .field("stream_given", &self.writer.is_none())
            .field("finished", &self.closer.is_none())
            .finish()
    }
}

/// Reading end of a body before it is handed to a consumer.
///
/// Transports use it to configure the read side, then convert it with
/// [`into_incoming`](Self::into_incoming).
pub struct BodyReceiver {
    reader: PipeReader,
    trailers: HostFuture<TrailersResult>,
}

impl BodyReceiver {
    /// Fail the body if a wait for more bytes exceeds `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reader = self.reader.with_idle_timeout(timeout);
        self
    }

    pub fn into_incoming(self) -> IncomingBody {
        IncomingBody {
            stream: Some(InputStream::new(self.reader)),
            trailers: self.trailers,
            children: ChildTracker::with_policy("incoming-body", DropPolicy::Detach),
        }
    }
}

impl fmt::Debug for BodyReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReceiver").finish_non_exhaustive()
    }
}

/// Reading end of a body.
pub struct IncomingBody {
    stream: Option<InputStream>,
    trailers: HostFuture<TrailersResult>,
    children: ChildTracker,
}

impl IncomingBody {
    /// The body's input stream. Available exactly once; later calls return
    /// `AlreadyGiven`.
    pub fn stream(&mut self) -> Result<InputStream, ResourceError> {
        let stream = self
            .stream
            .take()
            .ok_or(ResourceError::AlreadyGiven("incoming-body"))?;
        Ok(stream.with_parent(self.children.guard()))
    }

    /// Read the whole body into memory.
    pub async fn read_to_end(&mut self) -> Result<Bytes, BodyError> {
        let mut stream = self.stream()?;
        Ok(stream.read_to_end().await?)
    }

    /// Consume the body, yielding its trailers.
    ///
    /// Unread bytes are discarded.
    ///
    /// # Panics
    ///
    /// If the stream returned by [`stream`](Self::stream) is still alive.
    pub fn finish(self) -> FutureTrailers {
        self.children.assert_no_children();
        FutureTrailers {
            inner: self.trailers,
        }
    }
}

impl fmt::Debug for IncomingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingBody")
            .field("stream_given", &self.stream.is_none())
            .finish()
    }
}

/// Trailers of a finished incoming body.
#[derive(Debug)]
pub struct FutureTrailers {
    inner: HostFuture<TrailersResult>,
}

impl FutureTrailers {
    /// A pollable ready once the trailers (or an error) are available.
    pub fn subscribe(&self) -> Pollable {
        self.inner.subscribe()
    }

    /// `None` while pending, then `Some(Ok(trailers))` once, then
    /// `Some(Err(AlreadyRetrieved))`.
    pub fn get(&self) -> Option<Result<TrailersResult, ResourceError>> {
        self.inner.get()
    }

    /// Suspend until the trailers are available, then take them.
    pub async fn wait(&self) -> Result<TrailersResult, ResourceError> {
        self.inner.wait().await
    }
}

/// Lazily created body slot of an outgoing request or response.
///
/// The pipe is created on the first `write()`; converting a message whose
/// body was never taken yields an empty, finished body.
pub(crate) struct BodySlot {
    owner: &'static str,
    capacity: usize,
    state: SlotState,
}

enum SlotState {
    Unwritten,
    Given(BodyReceiver),
}

impl BodySlot {
    pub(crate) fn new(owner: &'static str) -> Self {
        Self {
            owner,
            capacity: DEFAULT_BUFFER_SIZE,
            state: SlotState::Unwritten,
        }
    }

    /// A zero capacity is raised to one byte; a pipe must admit a write.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    /// Make `contents` the whole body, already finished with empty trailers.
    ///
    /// Fails with `AlreadyGiven` once the body has been taken or filled.
    pub(crate) fn fill(&mut self, contents: Bytes) -> Result<(), ResourceError> {
        if matches!(self.state, SlotState::Given(_)) {
            return Err(ResourceError::AlreadyGiven(self.owner));
        }
        self.state = SlotState::Given(complete(contents));
        Ok(())
    }

    pub(crate) fn write(&mut self) -> Result<OutgoingBody, ResourceError> {
        if matches!(self.state, SlotState::Given(_)) {
            return Err(ResourceError::AlreadyGiven(self.owner));
        }
        let (body, receiver) = channel(self.capacity);
        self.state = SlotState::Given(receiver);
        Ok(body)
    }

    pub(crate) fn into_incoming(self, idle_timeout: Option<Duration>) -> IncomingBody {
        let receiver = match self.state {
            SlotState::Given(receiver) => receiver,
            SlotState::Unwritten => {
                let (body, receiver) = channel(1);
                body.finish(None);
                receiver
            }
        };
        receiver.with_idle_timeout(idle_timeout).into_incoming()
    }
}

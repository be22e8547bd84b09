use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::StreamResult;
use crate::poll::{Pollable, Subscribe};
use crate::resource::{ChildGuard, ChildTracker};
use crate::streams::{HostInputStream, StreamStatus};

/// Chunk size used by [`InputStream::read_to_end`].
const READ_CHUNK: usize = 16 * 1024;

/// A non-blocking source of bytes.
///
/// Once a read reports [`StreamStatus::Ended`] the stream stays ended: every
/// later read returns an empty buffer with `Ended` without touching the
/// transport.
pub struct InputStream {
    inner: Box<dyn HostInputStream>,
    ended: bool,
    children: ChildTracker,
    _parent: Option<ChildGuard>,
}

impl InputStream {
    pub fn new(inner: impl HostInputStream) -> Self {
        Self::from_boxed(Box::new(inner))
    }

    pub fn from_boxed(inner: Box<dyn HostInputStream>) -> Self {
        Self {
            inner,
            ended: false,
            children: ChildTracker::new("input-stream"),
            _parent: None,
        }
    }

    /// Mark this stream as a child of the resource that issued `guard`.
    pub fn with_parent(mut self, guard: ChildGuard) -> Self {
        self._parent = Some(guard);
        self
    }

    /// Whether a read has already reported the end of the stream.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Read up to `len` bytes without blocking.
    ///
    /// An empty `Open` result means no data is promptly available; wait on
    /// [`subscribe`](Self::subscribe) before trying again.
    pub fn read(&mut self, len: usize) -> StreamResult<(Bytes, StreamStatus)> {
        if self.ended {
            return Ok((Bytes::new(), StreamStatus::Ended));
        }
        let (bytes, status) = self.inner.read(len)?;
        debug_assert!(bytes.len() <= len, "transport returned more than requested");
        self.observe(status);
        Ok((bytes, status))
    }

    /// Like [`read`](Self::read), but first waits until at least one byte is
    /// available or the stream has ended.
    pub async fn blocking_read(&mut self, len: usize) -> StreamResult<(Bytes, StreamStatus)> {
        if len > 0 {
            self.readiness().ready().await;
        }
        self.read(len)
    }

    /// Discard up to `len` bytes without blocking.
    pub fn skip(&mut self, len: usize) -> StreamResult<(usize, StreamStatus)> {
        if self.ended {
            return Ok((0, StreamStatus::Ended));
        }
        let (skipped, status) = self.inner.skip(len)?;
        self.observe(status);
        Ok((skipped, status))
    }

    pub async fn blocking_skip(&mut self, len: usize) -> StreamResult<(usize, StreamStatus)> {
        if len > 0 {
            self.readiness().ready().await;
        }
        self.skip(len)
    }

    /// A pollable that is ready when a read would return data, report the
    /// end, or fail. Ready immediately once the stream has ended.
    ///
    /// The pollable is a child of this stream and must be dropped first.
    pub fn subscribe(&self) -> Pollable {
        Pollable::child(self.readiness(), self.children.guard())
    }

    /// Read until the stream ends, collecting every byte.
    pub async fn read_to_end(&mut self) -> StreamResult<Bytes> {
        let mut collected = BytesMut::new();
        loop {
            let (bytes, status) = self.blocking_read(READ_CHUNK).await?;
            collected.extend_from_slice(&bytes);
            if status == StreamStatus::Ended {
                return Ok(collected.freeze());
            }
        }
    }

    /// Readiness source for blocking compositions. Owned, so the waiting
    /// future does not borrow the (non-`Sync`) transport.
    pub(crate) fn readiness(&self) -> Arc<dyn Subscribe> {
        if self.ended {
            return Pollable::immediate_source();
        }
        self.inner.readiness()
    }

    fn observe(&mut self, status: StreamStatus) {
        if status == StreamStatus::Ended {
            tracing::trace!("input stream ended");
            self.ended = true;
        }
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("ended", &self.ended)
            .field("children", &self.children.live_children())
            .finish()
    }
}

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::StreamResult;
use crate::poll::{Pollable, Subscribe};
use crate::resource::{ChildGuard, ChildTracker};
use crate::streams::{HostOutputStream, InputStream};

/// Largest chunk moved per iteration of [`OutputStream::forward`].
const FORWARD_CHUNK: usize = 64 * 1024;

/// A non-blocking sink of bytes.
///
/// Every `write` must be preceded by a `check_write` whose permit covers it.
/// The permit is consumed by writes and reset by `flush`. Writing past the
/// permit is a caller bug and panics.
pub struct OutputStream {
    inner: Box<dyn HostOutputStream>,
    permit: usize,
    children: ChildTracker,
    _parent: Option<ChildGuard>,
}

impl OutputStream {
    pub fn new(inner: impl HostOutputStream) -> Self {
        Self::from_boxed(Box::new(inner))
    }

    pub fn from_boxed(inner: Box<dyn HostOutputStream>) -> Self {
        Self {
            inner,
            permit: 0,
            children: ChildTracker::new("output-stream"),
            _parent: None,
        }
    }

    /// Mark this stream as a child of the resource that issued `guard`.
    pub fn with_parent(mut self, guard: ChildGuard) -> Self {
        self._parent = Some(guard);
        self
    }

    /// How many bytes the next [`write`](Self::write) may carry.
    ///
    /// `Ok(0)` means the stream is backpressured or flushing; wait on
    /// [`subscribe`](Self::subscribe).
    pub fn check_write(&mut self) -> StreamResult<usize> {
        match self.inner.check_write() {
            Ok(permit) => {
                self.permit = permit;
                Ok(permit)
            }
            Err(err) => {
                self.permit = 0;
                Err(err)
            }
        }
    }

    /// Write `contents` without blocking.
    ///
    /// # Panics
    ///
    /// If `contents` is longer than the permit left by the last
    /// [`check_write`](Self::check_write).
    pub fn write(&mut self, contents: impl Into<Bytes>) -> StreamResult<()> {
        let contents = contents.into();
        self.consume_permit(contents.len());
        self.inner.write(contents)
    }

    /// Write `len` zero bytes. Same permit rules as [`write`](Self::write).
    pub fn write_zeroes(&mut self, len: usize) -> StreamResult<()> {
        self.consume_permit(len);
        self.inner.write_zeroes(len)
    }

    /// Request a flush. Returns immediately; `check_write` reports 0 until
    /// the flush completes.
    pub fn flush(&mut self) -> StreamResult<()> {
        self.permit = 0;
        self.inner.flush()
    }

    /// Flush and wait until the flush completes or an error is discovered.
    pub async fn blocking_flush(&mut self) -> StreamResult<()> {
        self.flush()?;
        self.readiness().ready().await;
        self.check_write().map(|_| ())
    }

    /// Write all of `contents`, waiting for permits as needed, then flush.
    pub async fn blocking_write_and_flush(&mut self, contents: impl Into<Bytes>) -> StreamResult<()> {
        let mut contents: Bytes = contents.into();
        self.blocking_write_with(contents.len(), |stream, len| {
            stream.write(contents.split_to(len))
        })
        .await
    }

    /// Write `len` zero bytes, waiting for permits as needed, then flush.
    pub async fn blocking_write_zeroes_and_flush(&mut self, len: usize) -> StreamResult<()> {
        self.blocking_write_with(len, |stream, len| stream.write_zeroes(len))
            .await
    }

    /// Move up to `len` bytes from `src` without blocking.
    ///
    /// Transfers at most what both the permit and `src` allow right now.
    /// Returns the number of bytes moved; `0` with `src.is_ended()` means
    /// the source is exhausted.
    pub fn splice(&mut self, src: &mut InputStream, len: usize) -> StreamResult<usize> {
        let permit = self.check_write()?;
        let len = len.min(permit);
        if len == 0 {
            return Ok(0);
        }
        let (bytes, _status) = src.read(len)?;
        let moved = bytes.len();
        if moved > 0 {
            self.write(bytes)?;
        }
        Ok(moved)
    }

    /// Like [`splice`](Self::splice), but first waits until `src` has data
    /// (or has ended) and this stream accepts writes.
    pub async fn blocking_splice(&mut self, src: &mut InputStream, len: usize) -> StreamResult<usize> {
        if len > 0 {
            src.readiness().ready().await;
            self.readiness().ready().await;
        }
        self.splice(src, len)
    }

    /// Copy `src` into this stream until `src` ends, then flush.
    ///
    /// Returns the total number of bytes moved.
    pub async fn forward(&mut self, src: &mut InputStream) -> StreamResult<u64> {
        let mut total = 0u64;
        while !src.is_ended() {
            let moved = self.blocking_splice(src, FORWARD_CHUNK).await?;
            total += moved as u64;
        }
        self.blocking_flush().await?;
        tracing::trace!(bytes = total, "forward complete");
        Ok(total)
    }

    /// A pollable that is ready when `check_write` would report a non-zero
    /// permit or an error. Ready immediately once the stream is closed.
    ///
    /// The pollable is a child of this stream and must be dropped first.
    pub fn subscribe(&self) -> Pollable {
        Pollable::child(self.readiness(), self.children.guard())
    }

    fn readiness(&self) -> Arc<dyn Subscribe> {
        self.inner.readiness()
    }

    fn consume_permit(&mut self, len: usize) {
        if len > self.permit {
            panic!(
                "write of {len} bytes exceeds the check_write permit of {} bytes",
                self.permit
            );
        }
        self.permit -= len;
    }

    /// Shared loop behind the blocking write compositions: wait for a
    /// permit, hand `write_chunk` at most that many bytes, repeat, flush.
    async fn blocking_write_with<F>(&mut self, mut remaining: usize, mut write_chunk: F) -> StreamResult<()>
    where
        F: FnMut(&mut Self, usize) -> StreamResult<()>,
    {
        while remaining > 0 {
            self.readiness().ready().await;
            let len = self.check_write()?.min(remaining);
            if len == 0 {
                continue;
            }
            write_chunk(&mut *self, len)?;
            remaining -= len;
        }
        self.blocking_flush().await
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("permit", &self.permit)
            .field("children", &self.children.live_children())
            .finish()
    }
}

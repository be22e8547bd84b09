//! Non-blocking byte streams.
//!
//! The transport behind a stream is pluggable: it implements
//! [`HostInputStream`] or [`HostOutputStream`], and callers only ever see
//! the [`InputStream`] / [`OutputStream`] wrappers. The wrappers own the
//! parts of the contract that do not depend on the transport:
//!
//! - the idempotent `ended` state of an input stream,
//! - the `check_write` permit that bounds every `write`,
//! - the blocking compositions built over `subscribe` + non-blocking calls,
//! - lifetime tracking of pollables derived from the stream.
//!
//! # Key difference from blocking I/O
//!
//! `read`, `check_write`, `write` and `flush` always return promptly. When a
//! transport has nothing to offer they report it (empty read, zero permit)
//! and the caller waits on [`InputStream::subscribe`] /
//! [`OutputStream::subscribe`] before trying again.

pub mod input;
pub mod output;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::StreamResult;
use crate::poll::Subscribe;

pub use input::InputStream;
pub use output::OutputStream;

/// Whether further reads from an input stream may produce data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// More data may arrive; an empty read means "not yet".
    Open,
    /// The source is exhausted. Every later read returns empty + `Ended`.
    Ended,
}

/// Transport side of an input stream.
pub trait HostInputStream: Send + 'static {
    /// Read up to `size` bytes without blocking.
    ///
    /// Must never return more than `size` bytes. An empty `Open` result
    /// means no data is promptly available.
    fn read(&mut self, size: usize) -> StreamResult<(Bytes, StreamStatus)>;

    /// Discard up to `size` bytes without blocking, returning the count.
    fn skip(&mut self, size: usize) -> StreamResult<(usize, StreamStatus)> {
        let (bytes, status) = self.read(size)?;
        Ok((bytes.len(), status))
    }

    /// Readiness source: ready when data is available, the source ended, or
    /// the transport failed.
    fn readiness(&self) -> Arc<dyn Subscribe>;
}

/// Transport side of an output stream.
pub trait HostOutputStream: Send + 'static {
    /// Number of bytes the next `write` may accept. `Ok(0)` while
    /// backpressured or flushing.
    fn check_write(&mut self) -> StreamResult<usize>;

    /// Accept `bytes`. Callers never pass more than the last permit.
    fn write(&mut self, bytes: Bytes) -> StreamResult<()>;

    /// Request that buffered data be flushed. Never blocks.
    fn flush(&mut self) -> StreamResult<()>;

    /// Accept `len` zero bytes. Same precondition as `write`.
    fn write_zeroes(&mut self, len: usize) -> StreamResult<()> {
        self.write(Bytes::from(vec![0; len]))
    }

    /// Readiness source: ready when writes are accepted again (including
    /// after a flush completes) or an error has been discovered.
    fn readiness(&self) -> Arc<dyn Subscribe>;
}

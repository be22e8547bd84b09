//! In-memory transport: a bounded byte pipe.
//!
//! [`pipe`] returns a writer and a reader sharing one buffer. Bytes written
//! are readable immediately. The writer's permit is the free space in the
//! buffer, so a reader that stops reading backpressures the writer.
//!
//! Termination is tracked on the writer side:
//!
//! | Event                                     | Reader observes                     |
//! |-------------------------------------------|-------------------------------------|
//! | `PipeWriter` dropped (no closer taken)    | drain, then `Ended`                 |
//! | `PipeCloser::finish`                      | drain, then `Ended`                 |
//! | `PipeCloser::fail` / closer dropped       | drain, then one `LastOperationFailed`, then `Closed` |
//! | idle timeout while waiting for readiness  | same as `fail`                      |
//!
//! Dropping the reader makes every later writer operation return `Closed`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::error::{IoError, StreamError, StreamResult};
use crate::poll::{ReadyFuture, Subscribe};
use crate::streams::{HostInputStream, HostOutputStream, StreamStatus};

/// Create a pipe holding at most `capacity` unread bytes.
///
/// # Panics
///
/// If `capacity` is zero: the writer could never make progress.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    assert!(capacity > 0, "pipe capacity must be non-zero");
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            buffer: BytesMut::with_capacity(capacity.min(64 * 1024)),
            writer: WriterState::Open,
            reader_closed: false,
        }),
        notify: Notify::new(),
        capacity,
    });
    let writer = PipeWriter {
        shared: Arc::clone(&shared),
        finish_on_drop: true,
    };
    let reader = PipeReader {
        shared,
        idle_timeout: None,
    };
    (writer, reader)
}

/// A reader over `contents` whose writer has already finished.
///
/// Reads drain `contents`, then report `Ended`.
pub fn filled(contents: Bytes) -> PipeReader {
    let capacity = contents.len().max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            buffer: BytesMut::from(&contents[..]),
            writer: WriterState::Finished,
            reader_closed: false,
        }),
        notify: Notify::new(),
        capacity,
    });
    PipeReader {
        shared,
        idle_timeout: None,
    }
}

struct Shared {
    state: Mutex<PipeState>,
    notify: Notify,
    capacity: usize,
}

struct PipeState {
    buffer: BytesMut,
    writer: WriterState,
    reader_closed: bool,
}

enum WriterState {
    Open,
    Finished,
    Failed(IoError),
    /// The failure has been handed to the reader once.
    FailureReported,
}

impl PipeState {
    fn readable(&self) -> bool {
        !self.buffer.is_empty() || !matches!(self.writer, WriterState::Open)
    }

    fn writable(&self, capacity: usize) -> bool {
        self.reader_closed
            || !matches!(self.writer, WriterState::Open)
            || self.buffer.len() < capacity
    }

    fn writer_closed(&self) -> bool {
        self.reader_closed || !matches!(self.writer, WriterState::Open)
    }

    fn status(&mut self) -> StreamResult<StreamStatus> {
        match std::mem::replace(&mut self.writer, WriterState::FailureReported) {
            WriterState::Open => {
                self.writer = WriterState::Open;
                Ok(StreamStatus::Open)
            }
            WriterState::Finished => {
                self.writer = WriterState::Finished;
                Ok(StreamStatus::Ended)
            }
            WriterState::Failed(err) => Err(StreamError::LastOperationFailed(err)),
            WriterState::FailureReported => Err(StreamError::Closed),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the writer out of `Open`. No-op if it already left.
    fn close(&self, outcome: WriterState) {
        {
            let mut state = self.lock();
            if !matches!(state.writer, WriterState::Open) {
                return;
            }
            state.writer = outcome;
        }
        self.notify.notify_waiters();
    }

    async fn wait_until(&self, ready: impl Fn(&PipeState) -> bool) {
        loop {
            let notified = self.notify.notified();
            let is_ready = ready(&self.lock());
            if is_ready {
                return;
            }
            notified.await;
        }
    }
}

/// Writing half of a [`pipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
    finish_on_drop: bool,
}

impl PipeWriter {
    /// Take the handle that decides how the pipe terminates.
    ///
    /// Once a closer exists, dropping the writer no longer ends the pipe.
    /// The closer must call [`PipeCloser::finish`]; dropping it without
    /// doing so fails the pipe.
    pub fn closer(&mut self) -> PipeCloser {
        self.finish_on_drop = false;
        PipeCloser {
            shared: Arc::clone(&self.shared),
            settled: false,
        }
    }

    /// Whether the reading half has gone away.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.lock().reader_closed
    }
}

impl HostOutputStream for PipeWriter {
    fn check_write(&mut self) -> StreamResult<usize> {
        let state = self.shared.lock();
        if state.writer_closed() {
            return Err(StreamError::Closed);
        }
        Ok(self.shared.capacity.saturating_sub(state.buffer.len()))
    }

    fn write(&mut self, bytes: Bytes) -> StreamResult<()> {
        {
            let mut state = self.shared.lock();
            if state.writer_closed() {
                return Err(StreamError::Closed);
            }
            state.buffer.extend_from_slice(&bytes);
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    fn flush(&mut self) -> StreamResult<()> {
        if self.shared.lock().writer_closed() {
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    fn write_zeroes(&mut self, len: usize) -> StreamResult<()> {
        {
            let mut state = self.shared.lock();
            if state.writer_closed() {
                return Err(StreamError::Closed);
            }
            let filled = state.buffer.len() + len;
            state.buffer.resize(filled, 0);
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    fn readiness(&self) -> Arc<dyn Subscribe> {
        Arc::new(WriterReadiness {
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.finish_on_drop {
            self.shared.close(WriterState::Finished);
        }
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter")
            .field("capacity", &self.shared.capacity)
            .field("buffered", &self.shared.lock().buffer.len())
            .finish()
    }
}

/// Decides how a [`pipe`] terminates once the writer is done.
pub struct PipeCloser {
    shared: Arc<Shared>,
    settled: bool,
}

impl PipeCloser {
    /// End the pipe cleanly. The reader drains, then sees `Ended`.
    pub fn finish(mut self) {
        self.settled = true;
        self.shared.close(WriterState::Finished);
    }

    /// End the pipe with `error`. The reader drains, then sees the error.
    pub fn fail(mut self, error: IoError) {
        self.settled = true;
        self.shared.close(WriterState::Failed(error));
    }
}

impl Drop for PipeCloser {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.close(WriterState::Failed(IoError::new(
                "stream writer was dropped before it finished",
            )));
        }
    }
}

impl fmt::Debug for PipeCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeCloser")
            .field("settled", &self.settled)
            .finish()
    }
}

/// Reading half of a [`pipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
    idle_timeout: Option<Duration>,
}

impl PipeReader {
    /// Fail the pipe if a readiness wait sees no progress within `timeout`.
    ///
    /// The timer is only armed when the wait runs inside a tokio runtime.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

impl HostInputStream for PipeReader {
    fn read(&mut self, size: usize) -> StreamResult<(Bytes, StreamStatus)> {
        let bytes = {
            let mut state = self.shared.lock();
            if state.buffer.is_empty() {
                return state.status().map(|status| (Bytes::new(), status));
            }
            let len = size.min(state.buffer.len());
            state.buffer.split_to(len).freeze()
        };
        self.shared.notify.notify_waiters();
        Ok((bytes, StreamStatus::Open))
    }

    fn skip(&mut self, size: usize) -> StreamResult<(usize, StreamStatus)> {
        let skipped = {
            let mut state = self.shared.lock();
            if state.buffer.is_empty() {
                return state.status().map(|status| (0, status));
            }
            let len = size.min(state.buffer.len());
            state.buffer.advance(len);
            len
        };
        self.shared.notify.notify_waiters();
        Ok((skipped, StreamStatus::Open))
    }

    fn readiness(&self) -> Arc<dyn Subscribe> {
        Arc::new(ReaderReadiness {
            shared: Arc::clone(&self.shared),
            idle_timeout: self.idle_timeout,
        })
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.lock().reader_closed = true;
        self.shared.notify.notify_waiters();
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("buffered", &self.shared.lock().buffer.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

struct ReaderReadiness {
    shared: Arc<Shared>,
    idle_timeout: Option<Duration>,
}

impl Subscribe for ReaderReadiness {
    fn ready(&self) -> ReadyFuture<'_> {
        Box::pin(async move {
            if self.shared.lock().readable() {
                return;
            }
            let wait = self.shared.wait_until(PipeState::readable);
            // The idle clock needs a runtime timer. Without one the pollable
            // still reports readiness, it just never expires.
            let limit = match self.idle_timeout {
                Some(limit) if Handle::try_current().is_ok() => limit,
                _ => return wait.await,
            };
            if tokio::time::timeout(limit, wait).await.is_err() {
                tracing::debug!(timeout = ?limit, "pipe reader idle timeout elapsed");
                self.shared.close(WriterState::Failed(IoError::new(format!(
                    "no data received within {limit:?}"
                ))));
            }
        })
    }
}

struct WriterReadiness {
    shared: Arc<Shared>,
}

impl Subscribe for WriterReadiness {
    fn ready(&self) -> ReadyFuture<'_> {
        let capacity = self.shared.capacity;
        Box::pin(self.shared.wait_until(move |state| state.writable(capacity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::Pollable;

    fn readable(reader: &PipeReader) -> bool {
        Pollable::new(reader.readiness()).is_ready()
    }

    fn writable(writer: &PipeWriter) -> bool {
        Pollable::new(writer.readiness()).is_ready()
    }

    // ── Data flow ───────────────────────────────────────────────────

    #[test]
    fn writes_are_readable_immediately() {
        let (mut writer, mut reader) = pipe(16);
        assert!(!readable(&reader));

        writer.write(Bytes::from_static(b"hello")).unwrap();
        assert!(readable(&reader));

        let (bytes, status) = reader.read(3).unwrap();
        assert_eq!(&bytes[..], b"hel");
        assert_eq!(status, StreamStatus::Open);

        let (bytes, _) = reader.read(100).unwrap();
        assert_eq!(&bytes[..], b"lo");

        let (bytes, status) = reader.read(100).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(status, StreamStatus::Open);
    }

    #[test]
    fn permit_is_free_capacity() {
        let (mut writer, mut reader) = pipe(8);
        assert_eq!(writer.check_write().unwrap(), 8);

        writer.write(Bytes::from_static(b"abcdef")).unwrap();
        assert_eq!(writer.check_write().unwrap(), 2);

        writer.write(Bytes::from_static(b"gh")).unwrap();
        assert_eq!(writer.check_write().unwrap(), 0);
        assert!(!writable(&writer));

        reader.read(4).unwrap();
        assert_eq!(writer.check_write().unwrap(), 4);
        assert!(writable(&writer));
    }

    #[test]
    fn write_zeroes_fills_buffer() {
        let (mut writer, mut reader) = pipe(8);
        writer.write_zeroes(3).unwrap();
        let (bytes, _) = reader.read(8).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0]);
    }

    #[test]
    fn skip_discards_bytes() {
        let (mut writer, mut reader) = pipe(8);
        writer.write(Bytes::from_static(b"abcdef")).unwrap();
        assert_eq!(reader.skip(4).unwrap(), (4, StreamStatus::Open));
        let (bytes, _) = reader.read(8).unwrap();
        assert_eq!(&bytes[..], b"ef");
    }

    // ── Termination ─────────────────────────────────────────────────

    #[test]
    fn dropped_writer_ends_after_drain() {
        let (mut writer, mut reader) = pipe(8);
        writer.write(Bytes::from_static(b"xy")).unwrap();
        drop(writer);

        let (bytes, status) = reader.read(8).unwrap();
        assert_eq!(&bytes[..], b"xy");
        assert_eq!(status, StreamStatus::Open);

        for _ in 0..3 {
            let (bytes, status) = reader.read(8).unwrap();
            assert!(bytes.is_empty());
            assert_eq!(status, StreamStatus::Ended);
        }
    }

    #[test]
    fn closer_controls_termination() {
        let (mut writer, mut reader) = pipe(8);
        let closer = writer.closer();
        drop(writer);

        assert!(!readable(&reader));
        assert_eq!(reader.read(8).unwrap().1, StreamStatus::Open);

        closer.finish();
        assert!(readable(&reader));
        assert_eq!(reader.read(8).unwrap().1, StreamStatus::Ended);
    }

    #[test]
    fn failure_reported_once_then_closed() {
        let (mut writer, mut reader) = pipe(8);
        let closer = writer.closer();
        writer.write(Bytes::from_static(b"ok")).unwrap();
        closer.fail(IoError::new("upstream reset"));

        let (bytes, _) = reader.read(8).unwrap();
        assert_eq!(&bytes[..], b"ok");

        let err = reader.read(8).unwrap_err();
        assert_eq!(err, StreamError::failed("upstream reset"));
        assert_eq!(reader.read(8).unwrap_err(), StreamError::Closed);
        assert_eq!(reader.read(8).unwrap_err(), StreamError::Closed);
    }

    #[test]
    fn dropped_closer_fails_pipe() {
        let (mut writer, mut reader) = pipe(8);
        drop(writer.closer());

        match reader.read(8) {
            Err(StreamError::LastOperationFailed(err)) => {
                assert!(err.to_debug_string().contains("dropped before it finished"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // The writer side is closed too.
        assert_eq!(writer.check_write(), Err(StreamError::Closed));
    }

    #[test]
    fn dropped_reader_closes_writer() {
        let (mut writer, reader) = pipe(8);
        assert!(!writer.is_reader_closed());
        drop(reader);

        assert!(writer.is_reader_closed());
        assert!(writable(&writer));
        assert_eq!(writer.check_write(), Err(StreamError::Closed));
        assert_eq!(
            writer.write(Bytes::from_static(b"late")),
            Err(StreamError::Closed)
        );
        assert_eq!(writer.flush(), Err(StreamError::Closed));
    }

    #[test]
    #[should_panic(expected = "pipe capacity must be non-zero")]
    fn zero_capacity_panics() {
        let _ = pipe(0);
    }

    // ── Idle timeout ────────────────────────────────────────────────

    #[test]
    fn idle_timeout_readiness_checks_outside_runtime() {
        let (mut writer, reader) = pipe(8);
        let reader = reader.with_idle_timeout(Some(Duration::from_millis(50)));
        assert!(!readable(&reader));

        writer.write(Bytes::from_static(b"x")).unwrap();
        assert!(readable(&reader));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fails_reader() {
        let (_writer, reader) = pipe(8);
        let mut reader = reader.with_idle_timeout(Some(Duration::from_millis(50)));

        Pollable::new(reader.readiness()).block().await;

        match reader.read(8) {
            Err(StreamError::LastOperationFailed(err)) => {
                assert!(err.to_debug_string().contains("no data received"));
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_not_hit_when_data_arrives() {
        let (mut writer, reader) = pipe(8);
        let mut reader = reader.with_idle_timeout(Some(Duration::from_secs(1)));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.write(Bytes::from_static(b"late")).unwrap();
        });

        Pollable::new(reader.readiness()).block().await;
        let (bytes, status) = reader.read(8).unwrap();
        assert_eq!(&bytes[..], b"late");
        assert_eq!(status, StreamStatus::Open);
    }

    // ── Filled ──────────────────────────────────────────────────────

    #[test]
    fn filled_reader_drains_then_ends() {
        let mut reader = filled(Bytes::from_static(b"prefilled"));
        assert!(readable(&reader));

        let (bytes, status) = reader.read(4).unwrap();
        assert_eq!(&bytes[..], b"pref");
        assert_eq!(status, StreamStatus::Open);

        let (bytes, _) = reader.read(64).unwrap();
        assert_eq!(&bytes[..], b"illed");
        assert_eq!(reader.read(64).unwrap(), (Bytes::new(), StreamStatus::Ended));
    }

    #[test]
    fn filled_empty_reader_ends_immediately() {
        let mut reader = filled(Bytes::new());
        assert_eq!(reader.read(8).unwrap(), (Bytes::new(), StreamStatus::Ended));
    }
}

//! Readiness polling.
//!
//! A [`Pollable`] is an opaque handle for one asynchronous condition. It is
//! backed by a [`Subscribe`] source owned by whatever created it (a stream, a
//! future, a [`Signal`]). [`poll_list`] waits until at least one of several
//! pollables is ready and reports which.
//!
//! Polling never performs I/O and never fails. If the resource behind a
//! pollable has hit an error, the pollable is simply ready; the error is
//! reported by the resource's own operation (`read`, `check_write`, ...).

use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

use tokio::sync::Notify;

use crate::resource::ChildGuard;

/// Boxed future returned by [`Subscribe::ready`].
pub type ReadyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A source of readiness.
///
/// `ready` resolves once the underlying condition holds. It must be cheap to
/// call repeatedly: every poll builds a fresh future and drops it when the
/// poll returns.
pub trait Subscribe: Send + Sync + 'static {
    fn ready(&self) -> ReadyFuture<'_>;
}

/// A readiness handle.
///
/// Pollables derived from a stream or future are child resources: they hold
/// a [`ChildGuard`] and the parent panics if it is dropped first.
pub struct Pollable {
    source: Arc<dyn Subscribe>,
    _parent: Option<ChildGuard>,
}

impl Pollable {
    /// A standalone pollable over `source`.
    pub fn new(source: Arc<dyn Subscribe>) -> Self {
        Self {
            source,
            _parent: None,
        }
    }

    /// A pollable that is a child of the resource that issued `guard`.
    pub fn child(source: Arc<dyn Subscribe>, guard: ChildGuard) -> Self {
        Self {
            source,
            _parent: Some(guard),
        }
    }

    /// A pollable that is always ready.
    pub fn immediate() -> Self {
        Self::new(Self::immediate_source())
    }

    /// A readiness source that is always ready.
    pub fn immediate_source() -> Arc<dyn Subscribe> {
        Arc::new(Immediate)
    }

    /// Check readiness without suspending.
    pub fn is_ready(&self) -> bool {
        let mut ready = self.source.ready();
        let mut cx = Context::from_waker(Waker::noop());
        ready.as_mut().poll(&mut cx).is_ready()
    }

    /// Suspend until this pollable is ready. Same as [`poll_one`].
    pub async fn block(&self) {
        poll_one(self).await
    }
}

impl fmt::Debug for Pollable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pollable")
            .field("parent", &self._parent.as_ref().map(ChildGuard::parent))
            .finish()
    }
}

/// Wait for at least one of `pollables` to be ready.
///
/// Returns the indices of every pollable that was ready when the wait ended,
/// in ascending order. Each ready index appears exactly once.
///
/// # Panics
///
/// If `pollables` is empty, or holds more entries than a `u32` index can
/// address.
pub async fn poll_list(pollables: &[&Pollable]) -> Vec<u32> {
    assert!(!pollables.is_empty(), "poll_list requires at least one pollable");
    assert!(
        u32::try_from(pollables.len() - 1).is_ok(),
        "poll_list called with {} pollables; indices must fit in a u32",
        pollables.len()
    );

    let mut waiting: Vec<ReadyFuture<'_>> = pollables.iter().map(|p| p.source.ready()).collect();

    let ready = poll_fn(|cx| {
        let mut ready = Vec::new();
        for (index, fut) in waiting.iter_mut().enumerate() {
            if fut.as_mut().poll(cx).is_ready() {
                ready.push(index as u32);
            }
        }
        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    })
    .await;

    tracing::trace!(total = pollables.len(), ready = ?ready, "poll_list returned");
    ready
}

/// Wait until `pollable` is ready.
pub async fn poll_one(pollable: &Pollable) {
    pollable.source.ready().await
}

struct Immediate;

impl Subscribe for Immediate {
    fn ready(&self) -> ReadyFuture<'_> {
        Box::pin(async {})
    }
}

/// A one-way latch whose pollables become ready once it is raised.
///
/// Clones share the same latch. Raising is idempotent and permanent.
#[derive(Clone, Default)]
pub struct Signal {
    latch: Arc<Latch>,
}

#[derive(Default)]
struct Latch {
    raised: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the latch ready and wake every waiter.
    pub fn raise(&self) {
        self.latch.raised.store(true, Ordering::Release);
        self.latch.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.latch.raised.load(Ordering::Acquire)
    }

    /// A standalone pollable ready once the latch is raised.
    pub fn subscribe(&self) -> Pollable {
        Pollable::new(self.source())
    }

    /// The latch as a readiness source, for building child pollables.
    pub fn source(&self) -> Arc<dyn Subscribe> {
        self.latch.clone()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

impl Subscribe for Latch {
    fn ready(&self) -> ReadyFuture<'_> {
        Box::pin(async move {
            loop {
                // Created before the check so a concurrent `raise` is not missed.
                let notified = self.notify.notified();
                if self.raised.load(Ordering::Acquire) {
                    return;
                }
                notified.await;
            }
        })
    }
}

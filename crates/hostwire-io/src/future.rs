//! One-shot host futures.
//!
//! [`channel`] returns a [`Promise`] (the producing side, held by a transport
//! or a body writer) and a [`HostFuture`] (the consuming side). The consumer
//! observes resolution through [`HostFuture::subscribe`] and takes the value
//! with [`HostFuture::get`], which hands it out exactly once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ResourceError;
use crate::poll::{Pollable, Signal};
use crate::resource::ChildTracker;

/// Create a linked promise/future pair.
///
/// `resource` names the future in diagnostics. If the promise is dropped
/// without being resolved, the future resolves to `on_abandon()` so that
/// waiters never hang.
pub fn channel<T: Send + 'static>(
    resource: &'static str,
    on_abandon: fn() -> T,
) -> (Promise<T>, HostFuture<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState::Pending),
        resolved: Signal::new(),
    });
    let promise = Promise {
        slot: Arc::clone(&slot),
        resource,
        on_abandon: Some(on_abandon),
    };
    let future = HostFuture {
        slot,
        resource,
        children: ChildTracker::new(resource),
    };
    (promise, future)
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    resolved: Signal,
}

enum SlotState<T> {
    Pending,
    Resolved(T),
    Taken,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fill(&self, value: T) {
        *self.lock() = SlotState::Resolved(value);
        self.resolved.raise();
    }
}

/// Producing side of a one-shot future.
pub struct Promise<T> {
    slot: Arc<Slot<T>>,
    resource: &'static str,
    /// `None` once the promise has been resolved.
    on_abandon: Option<fn() -> T>,
}

impl<T> Promise<T> {
    /// Resolve the future with `value`.
    pub fn resolve(mut self, value: T) {
        self.on_abandon = None;
        self.slot.fill(value);
        tracing::trace!(resource = self.resource, "promise resolved");
    }

    /// Whether the consuming [`HostFuture`] has been dropped.
    pub fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.slot) == 1
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(on_abandon) = self.on_abandon.take() {
            tracing::debug!(resource = self.resource, "promise dropped unresolved");
            self.slot.fill(on_abandon());
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("resource", &self.resource)
            .field("resolved", &self.on_abandon.is_none())
            .finish()
    }
}

/// Consuming side of a one-shot future.
///
/// Pollables returned by [`subscribe`](HostFuture::subscribe) are children of
/// the future and must be dropped before it.
pub struct HostFuture<T> {
    slot: Arc<Slot<T>>,
    resource: &'static str,
    children: ChildTracker,
}

impl<T> HostFuture<T> {
    /// A pollable that becomes ready once the value is available.
    pub fn subscribe(&self) -> Pollable {
        Pollable::child(self.slot.resolved.source(), self.children.guard())
    }

    /// Take the value if it is ready.
    ///
    /// - `None` while pending.
    /// - `Some(Ok(value))` on the first call after resolution.
    /// - `Some(Err(AlreadyRetrieved))` on every call after that.
    pub fn get(&self) -> Option<Result<T, ResourceError>> {
        let mut state = self.slot.lock();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Pending => {
                *state = SlotState::Pending;
                None
            }
            SlotState::Resolved(value) => Some(Ok(value)),
            SlotState::Taken => Some(Err(ResourceError::AlreadyRetrieved(self.resource))),
        }
    }

    /// Whether `get` would return `Some`.
    pub fn is_ready(&self) -> bool {
        self.slot.resolved.is_raised()
    }

    /// Suspend until the value is ready, then take it.
    pub async fn wait(&self) -> Result<T, ResourceError> {
        loop {
            if let Some(result) = self.get() {
                return result;
            }
            let pollable = self.subscribe();
            pollable.block().await;
        }
    }
}

impl<T> fmt::Debug for HostFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFuture")
            .field("resource", &self.resource)
            .field("ready", &self.is_ready())
            .finish()
    }
}

//! Parent/child lifetime tracking for derived resources.
//!
//! A pollable derived from a stream, or a stream handed out by a body, is a
//! *child* of the resource that created it. The parent embeds a
//! [`ChildTracker`]; every child holds a [`ChildGuard`]. Tracking is plain
//! reference counting, so a violated ordering is detected at parent teardown
//! instead of turning into a dangling handle.

use std::fmt;
use std::sync::Arc;

/// What a [`ChildTracker`] does when its parent is dropped with live children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropPolicy {
    /// Panic. Used where dropping the parent first is a fatal usage error
    /// (pollables derived from streams and futures).
    Trap,
    /// Let the children outlive the parent. Children hold their own shared
    /// state, so nothing dangles.
    Detach,
}

/// Counts the live children derived from one parent resource.
pub struct ChildTracker {
    resource: &'static str,
    token: Arc<()>,
    policy: DropPolicy,
}

impl ChildTracker {
    /// Tracker that panics if the parent is dropped while children are alive.
    pub fn new(resource: &'static str) -> Self {
        Self::with_policy(resource, DropPolicy::Trap)
    }

    pub fn with_policy(resource: &'static str, policy: DropPolicy) -> Self {
        Self {
            resource,
            token: Arc::new(()),
            policy,
        }
    }

    /// Register a new child. The child is live until the guard is dropped.
    pub fn guard(&self) -> ChildGuard {
        ChildGuard {
            parent: self.resource,
            _token: Arc::clone(&self.token),
        }
    }

    /// Number of children currently alive.
    pub fn live_children(&self) -> usize {
        Arc::strong_count(&self.token) - 1
    }

    /// Name of the parent resource, used in diagnostics.
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Panic if any child is still alive.
    ///
    /// Terminal operations (`finish`) call this regardless of the drop policy.
    pub fn assert_no_children(&self) {
        let live = self.live_children();
        if live > 0 {
            panic!(
                "{} destroyed while {} child resource(s) derived from it are still alive",
                self.resource, live
            );
        }
    }
}

impl Drop for ChildTracker {
    fn drop(&mut self) {
        // A second panic during unwinding would abort the process.
        if self.policy == DropPolicy::Trap && !std::thread::panicking() {
            self.assert_no_children();
        }
    }
}

impl fmt::Debug for ChildTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildTracker")
            .field("resource", &self.resource)
            .field("live_children", &self.live_children())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Held by a child resource for as long as it is alive.
pub struct ChildGuard {
    parent: &'static str,
    _token: Arc<()>,
}

impl ChildGuard {
    /// Name of the parent this child was derived from.
    pub fn parent(&self) -> &'static str {
        self.parent
    }
}

impl fmt::Debug for ChildGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildGuard").field("parent", &self.parent).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_live_children() {
        let tracker = ChildTracker::new("input-stream");
        assert_eq!(tracker.live_children(), 0);

        let a = tracker.guard();
        let b = tracker.guard();
        assert_eq!(tracker.live_children(), 2);
        assert_eq!(a.parent(), "input-stream");

        drop(a);
        assert_eq!(tracker.live_children(), 1);
        drop(b);
        assert_eq!(tracker.live_children(), 0);
    }

    #[test]
    fn drop_without_children_is_fine() {
        let tracker = ChildTracker::new("output-stream");
        let guard = tracker.guard();
        drop(guard);
        drop(tracker);
    }

    #[test]
    #[should_panic(expected = "output-stream destroyed while 1 child resource(s)")]
    fn trap_policy_panics_on_drop_with_live_child() {
        let tracker = ChildTracker::new("output-stream");
        let guard = tracker.guard();
        drop(tracker);
        drop(guard);
    }

    #[test]
    fn detach_policy_lets_children_outlive_parent() {
        let tracker = ChildTracker::with_policy("incoming-body", DropPolicy::Detach);
        let guard = tracker.guard();
        drop(tracker);
        assert_eq!(guard.parent(), "incoming-body");
    }

    #[test]
    #[should_panic(expected = "incoming-body destroyed while 1 child")]
    fn assert_no_children_ignores_policy() {
        let tracker = ChildTracker::with_policy("incoming-body", DropPolicy::Detach);
        let _guard = tracker.guard();
        tracker.assert_no_children();
    }
}

//! hostwire-io: host-agnostic I/O primitives.
//!
//! Provides the leaf resources every suspension point in hostwire is built on:
//! - **poll**: [`Pollable`] readiness handles, [`poll_list`] / [`poll_one`], and the [`Signal`] latch
//! - **resource**: parent/child lifetime tracking for derived handles
//! - **future**: one-shot [`HostFuture`]s resolved through a [`Promise`]
//! - **streams**: non-blocking [`InputStream`] / [`OutputStream`] with explicit backpressure
//! - **pipe**: a bounded in-memory transport implementing both stream host traits
//! - **error**: stream and resource-usage errors
//!
//! # Execution model
//!
//! Non-blocking operations (`read`, `check_write`, `write`, `flush`, ...) are
//! plain methods that return promptly. Every operation that may suspend is an
//! `async fn`: it parks only the calling task, never the runtime.
//!
//! Contract violations (writing past a `check_write` permit, polling an empty
//! list, dropping a parent while derived pollables are alive) panic. They are
//! programming defects, not environmental failures.

pub mod error;
pub mod future;
pub mod pipe;
pub mod poll;
pub mod resource;
pub mod streams;

pub use error::{IoError, ResourceError, StreamError, StreamResult};
pub use future::{HostFuture, Promise};
pub use pipe::{PipeCloser, PipeReader, PipeWriter, filled, pipe};
pub use poll::{Pollable, Signal, Subscribe, poll_list, poll_one};
pub use resource::{ChildGuard, ChildTracker, DropPolicy};
pub use streams::{HostInputStream, HostOutputStream, InputStream, OutputStream, StreamStatus};

// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use std::sync::Arc;
use static_assertions::assert_impl_all;

/// Identifies one suspension of one task within an executor.
///
/// Tickets are allocated monotonically by the executor's scheduler and are
/// never reused within the executor's lifetime, so a stale handle can never
/// resume the wrong task.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Ticket(u64);

impl Ticket {
    pub(crate) const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_u64().fmt(f)
    }
}

/// The ticket accounting capability backing [`SuspendedTask`] handles.
///
/// Every ticket handed out must be individually resolved: cloning a handle
/// duplicates its ticket, dropping or resuming a handle resolves it. An
/// executor implements this trait on its shared dispatcher so that handles
/// can be cloned, resumed and dropped from any thread, including threads the
/// executor does not manage.
pub trait Resolver: Send + Sync {
    /// Duplicates the ticket, incrementing its reference count.
    ///
    /// The returned ticket has the same numeric value but counts as a
    /// distinct reference that must be separately resolved.
    fn duplicate_ticket(&self, ticket: Ticket) -> Ticket;

    /// Consumes one reference to the ticket.
    ///
    /// With `resume_task` set, the associated task is moved back onto the
    /// runnable queue unless it has already been resumed. Resolving the last
    /// reference without the task ever having been resumed abandons the
    /// task: it is destroyed, since nothing can make it runnable again.
    fn resolve_ticket(&self, ticket: Ticket, resume_task: bool);
}

/// A reference-counted handle to a task awaiting resumption.
///
/// A continuation obtains one by calling
/// [`Context::suspend_task`](crate::Context::suspend_task) before returning
/// pending. Whoever later observes the awaited event calls
/// [`resume_task`](SuspendedTask::resume_task) to make the task runnable
/// again. If every handle is dropped without a resume, the task is abandoned
/// and destroyed.
///
/// Cloning duplicates the ticket; dropping releases it. Resuming a task that
/// has already been resumed is a no-op. All operations are safe from any
/// thread.
pub struct SuspendedTask {
    inner: Option<(Arc<dyn Resolver>, Ticket)>,
}

assert_impl_all!(SuspendedTask: Send);

// === impl SuspendedTask ===

impl SuspendedTask {
    /// Creates an empty handle whose operations are all no-ops.
    #[must_use]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(resolver: Arc<dyn Resolver>, ticket: Ticket) -> Self {
        Self {
            inner: Some((resolver, ticket)),
        }
    }

    /// Returns true if this handle does not hold a ticket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Asks the task's executor to resume the suspended task if it has not
    /// already been resumed, releasing this handle's ticket.
    ///
    /// The handle is empty afterwards; calling this again does nothing.
    pub fn resume_task(&mut self) {
        self.resolve(true);
    }

    /// Releases the ticket without resuming the task.
    ///
    /// The handle is empty afterwards. Does nothing on an empty handle.
    pub fn reset(&mut self) {
        self.resolve(false);
    }

    fn resolve(&mut self, resume_task: bool) {
        // Empty the handle before calling into the resolver: resolving may
        // destroy the task, whose own destructor can re-enter by dropping
        // further `SuspendedTask` handles.
        if let Some((resolver, ticket)) = self.inner.take() {
            resolver.resolve_ticket(ticket, resume_task);
        }
    }
}

impl Default for SuspendedTask {
    fn default() -> Self {
        Self::empty()
    }
}

impl Clone for SuspendedTask {
    fn clone(&self) -> Self {
        Self {
            inner: self
                .inner
                .as_ref()
                .map(|(resolver, ticket)| (Arc::clone(resolver), resolver.duplicate_ticket(*ticket))),
        }
    }
}

impl Drop for SuspendedTask {
    fn drop(&mut self) {
        self.resolve(false);
    }
}

impl fmt::Debug for SuspendedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SuspendedTask");
        match &self.inner {
            Some((_, ticket)) => s.field("ticket", ticket).finish(),
            None => s.field("ticket", &"<empty>").finish(),
        }
    }
}

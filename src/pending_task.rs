// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::executor::Context;
use crate::promise::{BoxPromise, Continuation, Promise};
use core::fmt;
use core::mem;
use static_assertions::assert_impl_all;

/// A type-erased task ready to be scheduled on an
/// [`Executor`](crate::Executor).
///
/// A pending task wraps a boxed promise whose result has been discarded: the
/// executor only cares whether the task finished, not what it produced. To
/// consume a promise's result, capture it with a combinator such as
/// [`then`](crate::Promise::then) before wrapping the promise into a task.
///
/// The single heap allocation of the type erasure happens here, once per
/// scheduled task, no matter how many combinators were chained beforehand.
pub struct PendingTask {
    promise: BoxPromise<(), ()>,
}

assert_impl_all!(PendingTask: Send);

// === impl PendingTask ===

impl PendingTask {
    /// Wraps any promise, boxed or unboxed, regardless of its result type.
    ///
    /// An empty promise yields an empty task.
    pub fn new<C>(promise: Promise<C>) -> Self
    where
        C: Continuation + Send + 'static,
    {
        if promise.is_empty() {
            Self {
                promise: Promise::empty(),
            }
        } else {
            Self {
                promise: promise.discard_result().boxed(),
            }
        }
    }

    /// Returns true if the task no longer holds a promise, either because it
    /// completed or because it was created from an empty promise.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promise.is_empty()
    }

    /// Evaluates the task, returning true if it completed.
    ///
    /// On completion the task reverts to the empty state (the promise it
    /// holds reverts to the empty state).
    ///
    /// # Panics
    ///
    /// Panics if the task is empty.
    pub fn poll(&mut self, cx: &mut dyn Context) -> bool {
        self.promise.poll(cx).is_ready()
    }

    /// Extracts the task's promise, leaving the task empty.
    pub fn take_promise(&mut self) -> BoxPromise<(), ()> {
        mem::replace(&mut self.promise, Promise::empty())
    }
}

impl From<BoxPromise<(), ()>> for PendingTask {
    /// Wraps an already boxed promise of the right shape without re-boxing.
    fn from(promise: BoxPromise<(), ()>) -> Self {
        Self { promise }
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

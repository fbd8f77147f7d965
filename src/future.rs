// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A container that holds a promise until it completes, then retains its
//! result.

use crate::async_result::AsyncResult;
use crate::executor::Context;
use crate::promise::{Continuation, Promise};
use core::fmt;
use core::mem;

/// The observable state of a [`Future`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FutureState {
    /// Neither a result nor a promise that could produce one.
    Empty,
    /// A promise that must be polled to make progress.
    Pending,
    /// A retained successful result.
    Ok,
    /// A retained failed result.
    Error,
}

/// Holds a [`Promise`] until it completes, then provides access to its
/// result.
///
/// Unlike a promise, a future retains the result its task produced, which
/// eases writing combined tasks that await the results of other tasks before
/// proceeding. A future is lazy: it only makes progress when its owner
/// invokes [`poll`](Future::poll), and its state never changes spontaneously.
///
/// A future never holds a promise and a result at the same time: the moment
/// a poll returns a non-pending result, the promise is dropped and replaced
/// by the result state.
pub struct Future<C>
where
    C: Continuation,
{
    state: State<C>,
}

enum State<C>
where
    C: Continuation,
{
    Empty,
    Promise(Promise<C>),
    Ready(AsyncResult<C::Ok, C::Error>),
}

/// Returns a future holding `promise`.
pub fn make_future<C>(promise: Promise<C>) -> Future<C>
where
    C: Continuation,
{
    Future::new(promise)
}

// === impl Future ===

impl<C> Future<C>
where
    C: Continuation,
{
    /// Creates an empty future.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            state: State::Empty,
        }
    }

    /// Creates a future holding a promise to compute its result.
    ///
    /// An empty promise yields an empty future.
    #[must_use]
    pub fn new(promise: Promise<C>) -> Self {
        if promise.is_empty() {
            Self::empty()
        } else {
            Self {
                state: State::Promise(promise),
            }
        }
    }

    /// Creates a future holding an already computed result.
    ///
    /// A pending result yields an empty future.
    #[must_use]
    pub fn from_result(result: AsyncResult<C::Ok, C::Error>) -> Self {
        if result.is_pending() {
            Self::empty()
        } else {
            Self {
                state: State::Ready(result),
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> FutureState {
        match &self.state {
            State::Empty => FutureState::Empty,
            State::Promise(_) => FutureState::Pending,
            State::Ready(result) if result.is_ok() => FutureState::Ok,
            State::Ready(_) => FutureState::Error,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.state, State::Empty)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Promise(_))
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.state() == FutureState::Ok
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.state() == FutureState::Error
    }

    /// Returns true if the future holds a result.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Evaluates the future and returns true once its result is ready.
    ///
    /// Polling an empty future returns false; polling a future that already
    /// holds a result returns true without invoking anything. Otherwise the
    /// contained promise is polled; if it completes, the promise is dropped
    /// and the result retained in its place.
    pub fn poll(&mut self, cx: &mut dyn Context) -> bool {
        match &mut self.state {
            State::Empty => false,
            State::Promise(promise) => {
                let result = promise.poll(cx);
                if result.is_pending() {
                    false
                } else {
                    self.state = State::Ready(result);
                    true
                }
            }
            State::Ready(_) => true,
        }
    }

    /// Borrows the contained promise.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the pending state.
    #[must_use]
    pub fn promise(&self) -> &Promise<C> {
        match &self.state {
            State::Promise(promise) => promise,
            _ => panic!("no promise in a {:?} future", self.state()),
        }
    }

    /// Takes the contained promise, leaving the future empty.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the pending state.
    pub fn take_promise(&mut self) -> Promise<C> {
        match mem::replace(&mut self.state, State::Empty) {
            State::Promise(promise) => promise,
            state => {
                self.state = state;
                panic!("no promise in a {:?} future", self.state())
            }
        }
    }

    /// Borrows the retained result.
    ///
    /// # Panics
    ///
    /// Panics unless the future holds a result.
    #[must_use]
    pub fn result(&self) -> &AsyncResult<C::Ok, C::Error> {
        match &self.state {
            State::Ready(result) => result,
            _ => panic!("no result in a {:?} future", self.state()),
        }
    }

    /// Takes the retained result, leaving the future empty.
    ///
    /// # Panics
    ///
    /// Panics unless the future holds a result.
    pub fn take_result(&mut self) -> AsyncResult<C::Ok, C::Error> {
        match mem::replace(&mut self.state, State::Empty) {
            State::Ready(result) => result,
            state => {
                self.state = state;
                panic!("no result in a {:?} future", self.state())
            }
        }
    }

    /// Borrows the retained success value.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the ok state.
    #[must_use]
    pub fn value(&self) -> &C::Ok {
        self.result().value()
    }

    /// Takes the retained success value, leaving the future empty.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the ok state.
    pub fn take_value(&mut self) -> C::Ok {
        self.take_result().take_value()
    }

    /// Borrows the retained error value.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the error state.
    #[must_use]
    pub fn error(&self) -> &C::Error {
        self.result().error()
    }

    /// Takes the retained error value, leaving the future empty.
    ///
    /// # Panics
    ///
    /// Panics unless the future is in the error state.
    pub fn take_error(&mut self) -> C::Error {
        self.take_result().take_error()
    }
}

impl<C> Default for Future<C>
where
    C: Continuation,
{
    fn default() -> Self {
        Self::empty()
    }
}

impl<C> From<Promise<C>> for Future<C>
where
    C: Continuation,
{
    fn from(promise: Promise<C>) -> Self {
        Self::new(promise)
    }
}

impl<C> From<AsyncResult<C::Ok, C::Error>> for Future<C>
where
    C: Continuation,
{
    fn from(result: AsyncResult<C::Ok, C::Error>) -> Self {
        Self::from_result(result)
    }
}

impl<C> fmt::Debug for Future<C>
where
    C: Continuation,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future").field("state", &self.state()).finish()
    }
}

// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Lazy, single-shot promises and their combinator algebra.
//!
//! A [`Promise`] wraps an asynchronous task in the form of a [`Continuation`]
//! that is repeatedly invoked by an executor until it produces a non-pending
//! [`AsyncResult`]. Additional work is chained onto a promise with
//! combinators such as [`then`](Promise::then), which consume the original
//! promise and return a new one.
//!
//! # Boxed and unboxed promises
//!
//! The promises returned by [`make_promise`] and by combinators are
//! parameterized by concrete continuation types, often deeply nested. These
//! "unboxed" promises carry full type information and chain without heap
//! allocation. [`Promise::boxed`] erases the continuation behind a single
//! owning pointer, yielding the transportable [`BoxPromise`] alias. Defer
//! boxing until a promise has to cross a type-erasure boundary (storing it,
//! scheduling it); every combinator applied before that point is free.
//!
//! # Single ownership
//!
//! A promise exclusively owns its continuation. Applying a combinator or
//! boxing moves the continuation into the new promise, leaving the original
//! empty, and invoking an empty promise is a programmer error that panics.
//! Once a poll returns a non-pending result the continuation is dropped and
//! the promise reverts to empty; a poll that returns pending leaves the
//! continuation installed for the next invocation.

mod combinator;
mod join;

use crate::async_result::AsyncResult;
use crate::executor::Context;
use core::fmt;

pub use combinator::{
    AndThenContinuation, DiscardResultContinuation, FnContinuation, HandlerResult,
    InspectContinuation, OrElseContinuation, ResultContinuation, Step, ThenContinuation, Wrap,
};
pub use join::{
    JoinContinuation, JoinPromises, JoinVectorContinuation, join_promise_vector, join_promises,
};

/// An asynchronous computation step, invoked with the executor's [`Context`]
/// until it produces a non-pending result.
pub trait Continuation {
    /// The type produced on success.
    type Ok;
    /// The type produced on failure.
    type Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<Self::Ok, Self::Error>;
}

impl<C> Continuation for Box<C>
where
    C: Continuation + ?Sized,
{
    type Ok = C::Ok;
    type Error = C::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<Self::Ok, Self::Error> {
        (**self).run(cx)
    }
}

/// A type-erased, heap-allocated continuation.
pub type BoxContinuation<T, E> = Box<dyn Continuation<Ok = T, Error = E> + Send>;

/// The boxed form of a promise, produced by [`Promise::boxed`].
pub type BoxPromise<T, E> = Promise<BoxContinuation<T, E>>;

/// A lazy, single-shot asynchronous task.
///
/// See the [module documentation](self) for the full story.
pub struct Promise<C> {
    cont: Option<C>,
}

// === impl Promise ===

impl<C> Promise<C> {
    /// Creates an empty promise without a continuation.
    #[must_use]
    pub const fn empty() -> Self {
        Self { cont: None }
    }

    /// Creates a promise from a continuation.
    #[must_use]
    pub const fn with_continuation(cont: C) -> Self {
        Self { cont: Some(cont) }
    }

    /// Returns true if the promise has no continuation.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cont.is_none()
    }

    /// Takes the promise's continuation, leaving it empty.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty.
    pub fn take_continuation(&mut self) -> C {
        match self.cont.take() {
            Some(cont) => cont,
            None => panic!("took the continuation of an empty promise"),
        }
    }
}

impl<C> Promise<C>
where
    C: Continuation,
{
    /// Invokes the promise's continuation.
    ///
    /// If the continuation returns a non-pending result it is dropped before
    /// this call returns and the promise is left empty. A pending result
    /// leaves the continuation installed for a future call.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty.
    pub fn poll(&mut self, cx: &mut dyn Context) -> AsyncResult<C::Ok, C::Error> {
        let result = match &mut self.cont {
            Some(cont) => cont.run(cx),
            None => panic!("polled an empty promise"),
        };
        if result.is_ready() {
            self.cont = None;
        }
        result
    }

    /// Returns a promise which invokes `handler` once this promise completes
    /// (successfully or not), passing its result.
    ///
    /// The handler receives the execution context and the completed result
    /// (never pending), and returns either a ready [`AsyncResult`] /
    /// [`Result`], or another promise which is then polled to completion in
    /// its place.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty. Consumes the continuation, leaving
    /// this promise empty.
    pub fn then<H, R>(self, handler: H) -> Promise<ThenContinuation<C, H, R>>
    where
        H: FnOnce(&mut dyn Context, AsyncResult<C::Ok, C::Error>) -> R,
        R: HandlerResult,
    {
        assert!(!self.is_empty(), "chained `then` onto an empty promise");
        Promise::with_continuation(ThenContinuation::new(self, handler))
    }

    /// Returns a promise which invokes `handler` once this promise completes
    /// successfully, passing its value. An error completion bypasses the
    /// handler and is forwarded unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty. Consumes the continuation, leaving
    /// this promise empty.
    pub fn and_then<H, R>(self, handler: H) -> Promise<AndThenContinuation<C, H, R>>
    where
        H: FnOnce(&mut dyn Context, C::Ok) -> R,
        R: HandlerResult<Error = C::Error>,
    {
        assert!(!self.is_empty(), "chained `and_then` onto an empty promise");
        Promise::with_continuation(AndThenContinuation::new(self, handler))
    }

    /// Returns a promise which invokes `handler` once this promise completes
    /// with an error, passing the error. A successful completion bypasses
    /// the handler and is forwarded unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty. Consumes the continuation, leaving
    /// this promise empty.
    pub fn or_else<H, R>(self, handler: H) -> Promise<OrElseContinuation<C, H, R>>
    where
        H: FnOnce(&mut dyn Context, C::Error) -> R,
        R: HandlerResult<Ok = C::Ok>,
    {
        assert!(!self.is_empty(), "chained `or_else` onto an empty promise");
        Promise::with_continuation(OrElseContinuation::new(self, handler))
    }

    /// Returns a promise which lets `handler` examine or modify this
    /// promise's result once it completes, then forwards the result onwards.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty. Consumes the continuation, leaving
    /// this promise empty.
    pub fn inspect<H>(self, handler: H) -> Promise<InspectContinuation<C, H>>
    where
        H: FnOnce(&mut dyn Context, &mut AsyncResult<C::Ok, C::Error>),
    {
        assert!(!self.is_empty(), "chained `inspect` onto an empty promise");
        Promise::with_continuation(InspectContinuation::new(self, handler))
    }

    /// Returns a promise which discards this promise's result once it
    /// completes, producing `Ok(())` regardless of success or failure.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty. Consumes the continuation, leaving
    /// this promise empty.
    pub fn discard_result(self) -> Promise<DiscardResultContinuation<C>> {
        assert!(
            !self.is_empty(),
            "chained `discard_result` onto an empty promise"
        );
        Promise::with_continuation(DiscardResultContinuation::new(self))
    }

    /// Hands this promise to `wrapper`, returning whatever the wrapper
    /// produces. Wrappers impose cross-cutting behavior (sequencing, timing)
    /// onto promises without taking part in the combinator algebra.
    ///
    /// # Panics
    ///
    /// Panics if the promise is empty.
    pub fn wrap_with<W>(self, wrapper: &mut W) -> W::Output
    where
        W: Wrap<Self>,
    {
        assert!(!self.is_empty(), "wrapped an empty promise");
        wrapper.wrap(self)
    }

    /// Erases the continuation type behind a heap allocation, yielding a
    /// [`BoxPromise`] that is easy to store and pass around.
    ///
    /// An empty promise boxes to an empty promise.
    #[must_use]
    pub fn boxed(self) -> BoxPromise<C::Ok, C::Error>
    where
        C: Send + 'static,
    {
        match self.cont {
            Some(cont) => Promise::with_continuation(Box::new(cont) as BoxContinuation<_, _>),
            None => Promise::empty(),
        }
    }
}

impl<C> Default for Promise<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C> fmt::Debug for Promise<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// Returns a promise that wraps `handler`.
///
/// The handler is invoked with the execution context on every poll until it
/// produces a ready result, so it may return pending any number of times
/// (typically after arranging its own resumption through
/// [`Context::suspend_task`]). A handler that returns another promise is
/// invoked once; the returned promise is then polled in its place.
pub fn make_promise<H, R>(handler: H) -> Promise<FnContinuation<H, R>>
where
    H: FnMut(&mut dyn Context) -> R,
    R: HandlerResult,
{
    Promise::with_continuation(FnContinuation::new(handler))
}

/// Returns a promise that immediately yields `result` on its first poll.
///
/// Especially useful for returning promises from functions with branches
/// that complete synchronously.
pub fn make_result_promise<T, E>(result: AsyncResult<T, E>) -> Promise<ResultContinuation<T, E>> {
    Promise::with_continuation(ResultContinuation::new(result))
}

/// Returns a promise that immediately yields `Ok(value)` on its first poll.
pub fn make_ok_promise<T, E>(value: T) -> Promise<ResultContinuation<T, E>> {
    make_result_promise(AsyncResult::Ok(value))
}

/// Returns a promise that immediately yields `Error(error)` on its first
/// poll.
pub fn make_error_promise<T, E>(error: E) -> Promise<ResultContinuation<T, E>> {
    make_result_promise(AsyncResult::Error(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_util::NoopContext;

    fn poll_to_completion<C: Continuation>(promise: &mut Promise<C>) -> AsyncResult<C::Ok, C::Error> {
        let mut cx = NoopContext;
        for _ in 0..256 {
            let result = promise.poll(&mut cx);
            if result.is_ready() {
                return result;
            }
        }
        panic!("promise did not complete");
    }

    #[test]
    fn empty_promise() {
        let promise = Promise::<ResultContinuation<u32, ()>>::empty();
        assert!(promise.is_empty());

        let promise = Promise::<ResultContinuation<u32, ()>>::default();
        assert!(promise.is_empty());
    }

    #[test]
    #[should_panic(expected = "polled an empty promise")]
    fn polling_empty_promise_panics() {
        let mut promise = Promise::<ResultContinuation<u32, ()>>::empty();
        let mut cx = NoopContext;
        let _ = promise.poll(&mut cx);
    }

    #[test]
    fn completion_empties_the_promise() {
        let mut promise = make_ok_promise::<u32, ()>(42);
        assert!(!promise.is_empty());
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(42));
        assert!(promise.is_empty());
    }

    #[test]
    fn pending_leaves_the_continuation_installed() {
        let mut polls = 0;
        let mut promise = make_promise(move |_cx| {
            polls += 1;
            if polls < 3 {
                AsyncResult::<u32, ()>::Pending
            } else {
                AsyncResult::Ok(polls)
            }
        });

        let mut cx = NoopContext;
        assert!(promise.poll(&mut cx).is_pending());
        assert!(!promise.is_empty());
        assert!(promise.poll(&mut cx).is_pending());
        assert_eq!(promise.poll(&mut cx), AsyncResult::Ok(3));
        assert!(promise.is_empty());
    }

    #[test]
    fn chained_then() {
        let mut promise = make_ok_promise::<i32, String>(10)
            .then(|_cx, result| {
                let value = result.into_result().unwrap().unwrap();
                AsyncResult::<i32, String>::Ok(value * value)
            })
            .then(|_cx, result| {
                let value = result.into_result().unwrap().unwrap();
                AsyncResult::<String, String>::Ok(value.to_string())
            });

        assert_eq!(
            poll_to_completion(&mut promise),
            AsyncResult::Ok("100".to_string())
        );
    }

    #[test]
    fn then_receives_errors_too() {
        let mut promise = make_error_promise::<u32, &str>("boom")
            .then(|_cx, result| AsyncResult::<bool, ()>::Ok(result.is_error()));
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(true));
    }

    #[test]
    fn and_then_short_circuits_on_error() {
        let mut promise = make_result_promise::<i32, String>(AsyncResult::Ok(10)).and_then(
            |_cx, value| {
                if value % 2 == 0 {
                    AsyncResult::Error("even".to_string())
                } else {
                    AsyncResult::Ok(value + 1)
                }
            },
        );
        assert_eq!(
            poll_to_completion(&mut promise),
            AsyncResult::Error("even".to_string())
        );

        let mut promise =
            make_error_promise::<i32, String>("upstream".to_string()).and_then(|_cx, value| {
                AsyncResult::<i32, String>::Ok(value + 1)
            });
        assert_eq!(
            poll_to_completion(&mut promise),
            AsyncResult::Error("upstream".to_string())
        );
    }

    #[test]
    fn or_else_recovers_from_errors() {
        let mut promise = make_error_promise::<u32, &str>("boom")
            .or_else(|_cx, error| AsyncResult::<u32, ()>::Ok(error.len() as u32));
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(4));

        let mut promise = make_ok_promise::<u32, &str>(7)
            .or_else(|_cx, _error| AsyncResult::<u32, ()>::Error(()));
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(7));
    }

    #[test]
    fn handlers_may_return_results() {
        let mut promise = make_ok_promise::<u32, String>(2).and_then(|_cx, value| {
            if value > 10 {
                Err("too big".to_string())
            } else {
                Ok(value * 3)
            }
        });
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(6));
    }

    #[test]
    fn handlers_may_return_promises() {
        let mut promise = make_ok_promise::<u32, ()>(5)
            .and_then(|_cx, value| make_ok_promise::<u32, ()>(value * 2));
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(10));

        // The inner promise may itself take several polls to complete.
        let mut promise = make_ok_promise::<u32, ()>(1).and_then(|_cx, value| {
            let mut polls = 0;
            make_promise(move |_cx| {
                polls += 1;
                if polls < 4 {
                    AsyncResult::Pending
                } else {
                    AsyncResult::<u32, ()>::Ok(value + polls)
                }
            })
        });
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(5));
    }

    #[test]
    fn inspect_sees_and_may_modify_the_result() {
        let mut seen = None;
        let mut promise = make_ok_promise::<u32, ()>(41).inspect(|_cx, result| {
            seen = Some(result.is_ok());
            if let AsyncResult::Ok(value) = result {
                *value += 1;
            }
        });
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(42));
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn discard_result_always_succeeds() {
        let mut promise = make_ok_promise::<u32, ()>(7).discard_result();
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(()));

        let mut promise = make_error_promise::<u32, &str>("boom").discard_result();
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(()));
    }

    #[test]
    fn wrap_with_applies_the_wrapper() {
        struct CountingWrapper {
            wrapped: usize,
        }

        impl<C> Wrap<Promise<C>> for CountingWrapper
        where
            C: Continuation,
        {
            type Output = Promise<C>;

            fn wrap(&mut self, promise: Promise<C>) -> Promise<C> {
                self.wrapped += 1;
                promise
            }
        }

        let mut wrapper = CountingWrapper { wrapped: 0 };
        let mut promise = make_ok_promise::<u32, ()>(3).wrap_with(&mut wrapper);
        assert_eq!(wrapper.wrapped, 1);
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(3));
    }

    #[test]
    fn boxed_round_trip() {
        let mut promise: BoxPromise<u32, ()> = make_ok_promise::<u32, ()>(11)
            .and_then(|_cx, value| AsyncResult::<u32, ()>::Ok(value + 1))
            .boxed();
        assert!(!promise.is_empty());
        assert_eq!(poll_to_completion(&mut promise), AsyncResult::Ok(12));
        assert!(promise.is_empty());

        let boxed_empty = Promise::<ResultContinuation<u32, ()>>::empty().boxed();
        assert!(boxed_empty.is_empty());
    }

    #[test]
    fn take_continuation_empties_the_promise() {
        let mut promise = make_ok_promise::<u32, ()>(1);
        let mut cont = promise.take_continuation();
        assert!(promise.is_empty());

        let mut cx = NoopContext;
        assert_eq!(cont.run(&mut cx), AsyncResult::Ok(1));
    }

    #[test]
    #[should_panic(expected = "empty promise")]
    fn combinator_on_empty_promise_panics() {
        let promise = Promise::<ResultContinuation<u32, ()>>::empty();
        let _ = promise.discard_result();
    }
}

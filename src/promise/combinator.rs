// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The continuations behind the [`Promise`] combinators.
//!
//! Each combinator on [`Promise`] returns an unboxed promise parameterized by
//! one of the continuation types in this module, so that chains of
//! combinators compose into a single object without heap allocation.

use crate::async_result::AsyncResult;
use crate::executor::Context;
use crate::future::Future;
use crate::promise::{Continuation, Promise};

/// The two ways a combinator handler's return value is consumed.
pub enum Step<T, E, C> {
    /// The handler produced a result synchronously.
    Ready(AsyncResult<T, E>),
    /// The handler produced another promise; its continuation is polled in
    /// place of the handler until it completes.
    Chain(Promise<C>),
}

/// A value a combinator handler may return.
///
/// Implemented for [`AsyncResult`] and [`Result`] (one-shot synchronous
/// producers) and for every [`Promise`] (an inner continuation installed on
/// first call, polled on subsequent calls, and dropped once it yields a
/// non-pending result).
pub trait HandlerResult {
    type Ok;
    type Error;
    type Cont: Continuation<Ok = Self::Ok, Error = Self::Error>;

    fn into_step(self) -> Step<Self::Ok, Self::Error, Self::Cont>;
}

impl<T, E> HandlerResult for AsyncResult<T, E> {
    type Ok = T;
    type Error = E;
    type Cont = ResultContinuation<T, E>;

    fn into_step(self) -> Step<T, E, Self::Cont> {
        Step::Ready(self)
    }
}

impl<T, E> HandlerResult for Result<T, E> {
    type Ok = T;
    type Error = E;
    type Cont = ResultContinuation<T, E>;

    fn into_step(self) -> Step<T, E, Self::Cont> {
        Step::Ready(self.into())
    }
}

impl<C> HandlerResult for Promise<C>
where
    C: Continuation,
{
    type Ok = C::Ok;
    type Error = C::Error;
    type Cont = C;

    fn into_step(self) -> Step<C::Ok, C::Error, C> {
        Step::Chain(self)
    }
}

/// A wrapper applicable to a promise through
/// [`Promise::wrap_with`](crate::Promise::wrap_with).
pub trait Wrap<P> {
    type Output;

    fn wrap(&mut self, promise: P) -> Self::Output;
}

/// The continuation produced by [`make_promise`](crate::make_promise).
pub struct FnContinuation<H, R>
where
    R: HandlerResult,
{
    handler: H,
    chained: Option<Future<R::Cont>>,
}

/// The continuation produced by [`Promise::then`](crate::Promise::then).
pub struct ThenContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    future: Future<C>,
    handler: Option<H>,
    chained: Future<R::Cont>,
}

/// The continuation produced by
/// [`Promise::and_then`](crate::Promise::and_then).
pub struct AndThenContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    future: Future<C>,
    handler: Option<H>,
    chained: Future<R::Cont>,
}

/// The continuation produced by
/// [`Promise::or_else`](crate::Promise::or_else).
pub struct OrElseContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    future: Future<C>,
    handler: Option<H>,
    chained: Future<R::Cont>,
}

/// The continuation produced by
/// [`Promise::inspect`](crate::Promise::inspect).
pub struct InspectContinuation<C, H> {
    promise: Promise<C>,
    inspector: Option<H>,
}

/// The continuation produced by
/// [`Promise::discard_result`](crate::Promise::discard_result).
pub struct DiscardResultContinuation<C> {
    promise: Promise<C>,
}

/// The continuation produced by
/// [`make_result_promise`](crate::make_result_promise) and friends.
pub struct ResultContinuation<T, E> {
    result: AsyncResult<T, E>,
}

// === impl FnContinuation ===

impl<H, R> FnContinuation<H, R>
where
    R: HandlerResult,
{
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            chained: None,
        }
    }
}

impl<H, R> Continuation for FnContinuation<H, R>
where
    H: FnMut(&mut dyn Context) -> R,
    R: HandlerResult,
{
    type Ok = R::Ok;
    type Error = R::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<R::Ok, R::Error> {
        if self.chained.is_none() {
            match (self.handler)(&mut *cx).into_step() {
                Step::Ready(result) => return result,
                Step::Chain(promise) => self.chained = Some(Future::new(promise)),
            }
        }
        if let Some(chained) = self.chained.as_mut() {
            if chained.poll(cx) {
                return chained.take_result();
            }
        }
        AsyncResult::Pending
    }
}

// === impl ThenContinuation ===

impl<C, H, R> ThenContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    pub(crate) fn new(promise: Promise<C>, handler: H) -> Self {
        Self {
            future: Future::new(promise),
            handler: Some(handler),
            chained: Future::empty(),
        }
    }
}

impl<C, H, R> Continuation for ThenContinuation<C, H, R>
where
    C: Continuation,
    H: FnOnce(&mut dyn Context, AsyncResult<C::Ok, C::Error>) -> R,
    R: HandlerResult,
{
    type Ok = R::Ok;
    type Error = R::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<R::Ok, R::Error> {
        if let Some(handler) = self.handler.take() {
            if !self.future.poll(cx) {
                self.handler = Some(handler);
                return AsyncResult::Pending;
            }
            match handler(&mut *cx, self.future.take_result()).into_step() {
                Step::Ready(result) => return result,
                Step::Chain(promise) => self.chained = Future::new(promise),
            }
        }
        poll_chained(&mut self.chained, cx)
    }
}

// === impl AndThenContinuation ===

impl<C, H, R> AndThenContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    pub(crate) fn new(promise: Promise<C>, handler: H) -> Self {
        Self {
            future: Future::new(promise),
            handler: Some(handler),
            chained: Future::empty(),
        }
    }
}

impl<C, H, R> Continuation for AndThenContinuation<C, H, R>
where
    C: Continuation,
    H: FnOnce(&mut dyn Context, C::Ok) -> R,
    R: HandlerResult<Error = C::Error>,
{
    type Ok = R::Ok;
    type Error = C::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<R::Ok, C::Error> {
        if let Some(handler) = self.handler.take() {
            if !self.future.poll(cx) {
                self.handler = Some(handler);
                return AsyncResult::Pending;
            }
            let value = match self.future.take_result() {
                AsyncResult::Ok(value) => value,
                AsyncResult::Error(error) => return AsyncResult::Error(error),
                AsyncResult::Pending => unreachable!("a ready future holds a ready result"),
            };
            match handler(&mut *cx, value).into_step() {
                Step::Ready(result) => return result,
                Step::Chain(promise) => self.chained = Future::new(promise),
            }
        }
        poll_chained(&mut self.chained, cx)
    }
}

// === impl OrElseContinuation ===

impl<C, H, R> OrElseContinuation<C, H, R>
where
    C: Continuation,
    R: HandlerResult,
{
    pub(crate) fn new(promise: Promise<C>, handler: H) -> Self {
        Self {
            future: Future::new(promise),
            handler: Some(handler),
            chained: Future::empty(),
        }
    }
}

impl<C, H, R> Continuation for OrElseContinuation<C, H, R>
where
    C: Continuation,
    H: FnOnce(&mut dyn Context, C::Error) -> R,
    R: HandlerResult<Ok = C::Ok>,
{
    type Ok = C::Ok;
    type Error = R::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<C::Ok, R::Error> {
        if let Some(handler) = self.handler.take() {
            if !self.future.poll(cx) {
                self.handler = Some(handler);
                return AsyncResult::Pending;
            }
            let error = match self.future.take_result() {
                AsyncResult::Ok(value) => return AsyncResult::Ok(value),
                AsyncResult::Error(error) => error,
                AsyncResult::Pending => unreachable!("a ready future holds a ready result"),
            };
            match handler(&mut *cx, error).into_step() {
                Step::Ready(result) => return result,
                Step::Chain(promise) => self.chained = Future::new(promise),
            }
        }
        poll_chained(&mut self.chained, cx)
    }
}

// === impl InspectContinuation ===

impl<C, H> InspectContinuation<C, H> {
    pub(crate) fn new(promise: Promise<C>, handler: H) -> Self {
        Self {
            promise,
            inspector: Some(handler),
        }
    }
}

impl<C, H> Continuation for InspectContinuation<C, H>
where
    C: Continuation,
    H: FnOnce(&mut dyn Context, &mut AsyncResult<C::Ok, C::Error>),
{
    type Ok = C::Ok;
    type Error = C::Error;

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<C::Ok, C::Error> {
        let mut result = self.promise.poll(&mut *cx);
        if result.is_ready() {
            if let Some(inspector) = self.inspector.take() {
                inspector(cx, &mut result);
            }
        }
        result
    }
}

// === impl DiscardResultContinuation ===

impl<C> DiscardResultContinuation<C> {
    pub(crate) fn new(promise: Promise<C>) -> Self {
        Self { promise }
    }
}

impl<C> Continuation for DiscardResultContinuation<C>
where
    C: Continuation,
{
    type Ok = ();
    type Error = ();

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<(), ()> {
        if self.promise.poll(cx).is_pending() {
            AsyncResult::Pending
        } else {
            AsyncResult::Ok(())
        }
    }
}

// === impl ResultContinuation ===

impl<T, E> ResultContinuation<T, E> {
    pub(crate) fn new(result: AsyncResult<T, E>) -> Self {
        Self { result }
    }
}

impl<T, E> Continuation for ResultContinuation<T, E> {
    type Ok = T;
    type Error = E;

    fn run(&mut self, _cx: &mut dyn Context) -> AsyncResult<T, E> {
        self.result.take()
    }
}

fn poll_chained<C>(chained: &mut Future<C>, cx: &mut dyn Context) -> AsyncResult<C::Ok, C::Error>
where
    C: Continuation,
{
    if chained.poll(cx) {
        chained.take_result()
    } else {
        AsyncResult::Pending
    }
}

// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Jointly evaluating several promises.

use crate::async_result::AsyncResult;
use crate::executor::Context;
use crate::future::Future;
use crate::promise::{Continuation, Promise};

/// A tuple of promises accepted by [`join_promises`].
pub trait JoinPromises {
    type Cont: Continuation;

    fn into_continuation(self) -> Self::Cont;
}

/// Jointly evaluates a tuple of promises.
///
/// Every constituent is polled on each invocation until it resolves;
/// completed constituents are not polled again. The joined promise completes
/// with `Ok` of the tuple of all constituent results once every constituent
/// has produced one. Constituent errors do not short-circuit: they appear as
/// `Error` results inside the tuple, and the joined promise itself never
/// fails.
pub fn join_promises<L>(promises: L) -> Promise<L::Cont>
where
    L: JoinPromises,
{
    Promise::with_continuation(promises.into_continuation())
}

/// Jointly evaluates a homogenous vector of promises, with the same
/// wait-for-all semantics as [`join_promises`].
pub fn join_promise_vector<C>(promises: Vec<Promise<C>>) -> Promise<JoinVectorContinuation<C>>
where
    C: Continuation,
{
    Promise::with_continuation(JoinVectorContinuation {
        futures: promises.into_iter().map(Future::new).collect(),
    })
}

/// The continuation produced by [`join_promises`].
pub struct JoinContinuation<F> {
    futures: F,
}

/// The continuation produced by [`join_promise_vector`].
pub struct JoinVectorContinuation<C>
where
    C: Continuation,
{
    futures: Vec<Future<C>>,
}

impl<C> Continuation for JoinVectorContinuation<C>
where
    C: Continuation,
{
    type Ok = Vec<AsyncResult<C::Ok, C::Error>>;
    type Error = ();

    fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<Self::Ok, ()> {
        let mut done = true;
        for future in &mut self.futures {
            done &= future.poll(&mut *cx);
        }
        if done {
            AsyncResult::Ok(self.futures.iter_mut().map(Future::take_result).collect())
        } else {
            AsyncResult::Pending
        }
    }
}

macro_rules! impl_join_promises {
    ($($P:ident => $idx:tt),+) => {
        impl<$($P,)+> JoinPromises for ($(Promise<$P>,)+)
        where
            $($P: Continuation,)+
        {
            type Cont = JoinContinuation<($(Future<$P>,)+)>;

            fn into_continuation(self) -> Self::Cont {
                JoinContinuation {
                    futures: ($(Future::new(self.$idx),)+),
                }
            }
        }

        impl<$($P,)+> Continuation for JoinContinuation<($(Future<$P>,)+)>
        where
            $($P: Continuation,)+
        {
            type Ok = ($(AsyncResult<$P::Ok, $P::Error>,)+);
            type Error = ();

            fn run(&mut self, cx: &mut dyn Context) -> AsyncResult<Self::Ok, ()> {
                let mut done = true;
                $(done &= self.futures.$idx.poll(&mut *cx);)+
                if done {
                    AsyncResult::Ok(($(self.futures.$idx.take_result(),)+))
                } else {
                    AsyncResult::Pending
                }
            }
        }
    };
}

impl_join_promises!(P0 => 0);
impl_join_promises!(P0 => 0, P1 => 1);
impl_join_promises!(P0 => 0, P1 => 1, P2 => 2);
impl_join_promises!(P0 => 0, P1 => 1, P2 => 2, P3 => 3);
impl_join_promises!(P0 => 0, P1 => 1, P2 => 2, P3 => 3, P4 => 4);
impl_join_promises!(P0 => 0, P1 => 1, P2 => 2, P3 => 3, P4 => 4, P5 => 5);

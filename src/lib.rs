// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Lazily-evaluated promises, a ticket-based single-threaded executor and a
//! raw io_uring ring wrapper.
//!
//! The crate is built from two tightly coupled halves:
//!
//! - A [`Promise`] is a single-shot task wrapped around a continuation that an
//!   executor polls until it produces a non-pending [`AsyncResult`]. Promises
//!   compose through combinators (`then`, `and_then`, `or_else`, ...), get
//!   type-erased into a [`PendingTask`] and run on an [`Executor`]. A task
//!   that cannot complete yet suspends itself through [`Context::suspend_task`]
//!   and is resumed (or abandoned) through the [`SuspendedTask`] handle it
//!   obtained.
//! - [`IoUring`] maps the kernel's submission/completion rings into the
//!   process, batches submission queue entries user-side and hands out
//!   completions, so that ring completions can drive suspended tasks back
//!   onto the runnable queue.
//!
//! [`IoUring`]: uring::IoUring

mod async_result;
mod error;
pub mod executor;
pub mod future;
mod loom;
mod pending_task;
pub mod promise;
pub mod scheduler;
mod suspended_task;
#[cfg(target_os = "linux")]
pub mod uring;

pub use async_result::AsyncResult;
pub use error::Errno;
pub use executor::{Context, Executor, InlineExecutor, SingleThreadedExecutor};
pub use future::{Future, FutureState, make_future};
pub use pending_task::PendingTask;
pub use promise::{
    BoxPromise, Continuation, Promise, join_promise_vector, join_promises, make_error_promise,
    make_ok_promise, make_promise, make_result_promise,
};
pub use scheduler::Scheduler;
pub use suspended_task::{Resolver, SuspendedTask, Ticket};

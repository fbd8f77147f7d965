// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::executor::{Context, Executor};
use crate::pending_task::PendingTask;
use crate::suspended_task::SuspendedTask;

/// An executor that runs each task inline, on the scheduling thread, at the
/// moment it is scheduled.
///
/// Scheduled tasks must complete in a single invocation: there is no queue
/// to return to, so suspension is not supported and a task attempting it
/// panics.
///
/// # Examples
///
/// ```
/// use riptide::{AsyncResult, Executor, InlineExecutor, PendingTask, make_ok_promise};
///
/// let executor = InlineExecutor::new();
/// let promise = make_ok_promise::<&str, ()>("inline").and_then(|_cx, s| {
///     assert_eq!(s.len(), 6);
///     AsyncResult::<(), ()>::Ok(())
/// });
/// executor.schedule_task(PendingTask::new(promise));
/// ```
#[derive(Debug, Default)]
pub struct InlineExecutor(());

struct ContextImpl<'e> {
    executor: &'e InlineExecutor,
}

// === impl InlineExecutor ===

impl InlineExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self(())
    }
}

impl Executor for InlineExecutor {
    /// Runs `task` to completion before returning.
    ///
    /// # Panics
    ///
    /// Panics if the task fails to complete in this one invocation.
    fn schedule_task(&self, mut task: PendingTask) {
        let mut ctx = ContextImpl { executor: self };
        let finished = task.poll(&mut ctx);
        assert!(finished, "a task suspended on the inline executor");
    }
}

impl Context for ContextImpl<'_> {
    fn executor(&self) -> &dyn Executor {
        self.executor
    }

    fn suspend_task(&mut self) -> SuspendedTask {
        panic!("tasks cannot suspend on the inline executor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_result::AsyncResult;
    use crate::promise::{make_ok_promise, make_promise};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn tasks_run_at_schedule_time() {
        let executor = InlineExecutor::new();
        let runs = Arc::new(AtomicU64::new(0));

        let count = Arc::clone(&runs);
        executor.schedule_task(PendingTask::new(
            make_ok_promise::<&str, u32>("inline")
                .and_then(|_cx, s| AsyncResult::<usize, u32>::Ok(s.len()))
                .then(move |_cx, result| {
                    assert_eq!(result, AsyncResult::Ok(6));
                    count.fetch_add(1, Ordering::Relaxed);
                    AsyncResult::<(), ()>::Ok(())
                }),
        ));

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn tasks_may_schedule_more_tasks() {
        let executor = InlineExecutor::new();
        let runs = Arc::new(AtomicU64::new(0));

        let count = Arc::clone(&runs);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                let count = Arc::clone(&count);
                cx.executor()
                    .schedule_task(PendingTask::new(make_promise(move |_cx| {
                        count.fetch_add(1, Ordering::Relaxed);
                        AsyncResult::<(), ()>::Ok(())
                    })));
                AsyncResult::<(), ()>::Ok(())
            },
        )));

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    #[should_panic(expected = "cannot suspend")]
    fn suspension_panics() {
        let executor = InlineExecutor::new();
        executor.schedule_task(PendingTask::new(make_promise(
            |cx: &mut dyn Context| {
                let _ = cx.suspend_task();
                AsyncResult::<(), ()>::Pending
            },
        )));
    }
}

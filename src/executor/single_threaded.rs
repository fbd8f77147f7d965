// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::executor::{Context, Executor};
use crate::loom::sync::{Condvar, Mutex};
use crate::pending_task::PendingTask;
use crate::scheduler::{Scheduler, TaskQueue};
use crate::suspended_task::{Resolver, SuspendedTask, Ticket};
use std::sync::Arc;

/// A simple platform-independent single-threaded task executor.
///
/// Tasks run cooperatively on whichever thread calls [`run`]: each runnable
/// task's continuation is invoked to completion, in FIFO order of becoming
/// runnable. When only suspended tasks remain the loop sleeps until one of
/// them is resumed; when no tasks remain at all, [`run`] returns.
///
/// [`schedule_task`](Executor::schedule_task), resuming and dropping
/// [`SuspendedTask`] handles, and dropping the executor itself are all safe
/// from any thread. Handles may even outlive the executor: the shared
/// dispatcher stays alive until the last one is resolved.
///
/// [`run`]: SingleThreadedExecutor::run
pub struct SingleThreadedExecutor {
    dispatcher: Arc<Dispatcher>,
}

/// The dispatcher runs tasks and resolves suspended-task tickets.
///
/// It is shared between the executor and every `SuspendedTask` handle issued
/// on its behalf, and is dropped when the last of those owners goes away —
/// which may be a handle on a foreign thread, long after the executor itself
/// was shut down.
struct Dispatcher {
    wake: Condvar,
    state: Mutex<DispatcherState>,
}

struct DispatcherState {
    was_shutdown: bool,
    /// True while the run loop sleeps on `wake` and wants a notification.
    need_wake: bool,
    scheduler: Scheduler,
}

/// The task context for tasks run by [`SingleThreadedExecutor`].
struct ContextImpl<'e> {
    executor: &'e SingleThreadedExecutor,
    /// The ticket obtained by the currently running task, if it suspended
    /// itself during this invocation.
    current_ticket: Option<Ticket>,
}

// === impl SingleThreadedExecutor ===

impl SingleThreadedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher {
                wake: Condvar::new(),
                state: Mutex::new(DispatcherState {
                    was_shutdown: false,
                    need_wake: false,
                    scheduler: Scheduler::new(),
                }),
            }),
        }
    }

    /// Runs all scheduled tasks, including tasks scheduled or resumed while
    /// the loop runs, until none remain.
    ///
    /// Must only be called on one thread at a time.
    pub fn run(&self) {
        let _span = tracing::debug_span!("executor main loop").entered();

        let mut ctx = ContextImpl {
            executor: self,
            current_ticket: None,
        };
        let mut tasks = TaskQueue::new();
        loop {
            self.dispatcher.wait_for_runnable_tasks(&mut tasks);
            if tasks.is_empty() {
                tracing::debug!("out of tasks, leaving the loop");
                return;
            }

            while let Some(task) = tasks.pop_front() {
                self.dispatcher.run_task(task, &mut ctx);
            }
        }
    }
}

impl Executor for SingleThreadedExecutor {
    fn schedule_task(&self, task: PendingTask) {
        debug_assert!(!task.is_empty());
        self.dispatcher.schedule_task(task);
    }
}

impl Default for SingleThreadedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SingleThreadedExecutor {
    /// Shuts the executor down, abandoning all of its remaining tasks.
    ///
    /// Outstanding tickets survive in the dispatcher so that live
    /// [`SuspendedTask`] handles on other threads can still be resolved.
    fn drop(&mut self) {
        let mut tasks = TaskQueue::new();
        {
            let mut state = self.dispatcher.state.lock().unwrap();
            debug_assert!(!state.was_shutdown);
            state.was_shutdown = true;
            state.scheduler.take_all_tasks(&mut tasks);
        }

        tracing::debug!(abandoned = tasks.len(), "executor shut down");
        // Task destructors may drop `SuspendedTask` handles and re-enter
        // `resolve_ticket`, so the queue must be dropped outside the lock.
        drop(tasks);
    }
}

// === impl Dispatcher ===

impl Dispatcher {
    fn schedule_task(&self, task: PendingTask) {
        let do_wake;
        {
            let mut state = self.state.lock().unwrap();
            assert!(
                !state.was_shutdown,
                "scheduled a task on a shut-down executor"
            );
            state.scheduler.schedule_task(task);
            do_wake = state.need_wake;
            state.need_wake = false;
        }

        // Notifying outside the lock spares the woken thread an immediate
        // block on the mutex.
        if do_wake {
            self.wake.notify_one();
        }
    }

    fn wait_for_runnable_tasks(&self, tasks: &mut TaskQueue) {
        let mut state = self.state.lock().unwrap();
        loop {
            debug_assert!(!state.was_shutdown);
            state.scheduler.take_runnable_tasks(tasks);
            if !tasks.is_empty() {
                return;
            }
            if !state.scheduler.has_suspended_tasks() {
                return;
            }
            tracing::trace!("only suspended tasks remain, sleeping");
            state.need_wake = true;
            state = self.wake.wait(state).unwrap();
            state.need_wake = false;
        }
    }

    fn run_task(&self, mut task: PendingTask, ctx: &mut ContextImpl<'_>) {
        debug_assert!(ctx.current_ticket.is_none());

        // The continuation runs without the lock held; it is free to call
        // back into `schedule_task` and `suspend_task`.
        let finished = task.poll(&mut *ctx);
        debug_assert_eq!(finished, task.is_empty());

        let Some(ticket) = ctx.current_ticket.take() else {
            // The task produced no ticket. Either it finished, or it
            // returned pending without suspending itself and is abandoned
            // when `task` drops here.
            return;
        };

        let abandoned = {
            let mut state = self.state.lock().unwrap();
            debug_assert!(!state.was_shutdown);
            state
                .scheduler
                .finalize_ticket(ticket, (!finished).then_some(task))
        };
        // An abandoned task's destructor may re-enter `resolve_ticket`; drop
        // it after the lock is gone.
        drop(abandoned);
    }

    /// Obtains (or duplicates) the running task's ticket.
    ///
    /// Only called from within `run_task`, on the executor thread. The first
    /// call takes two references: one for the returned handle and one
    /// retained until `finalize_ticket` observes the task's disposition.
    fn suspend_current_task(
        this: &Arc<Self>,
        current_ticket: &mut Option<Ticket>,
    ) -> SuspendedTask {
        let ticket = {
            let mut state = this.state.lock().unwrap();
            assert!(!state.was_shutdown);
            match *current_ticket {
                Some(ticket) => {
                    state.scheduler.duplicate_ticket(ticket);
                    ticket
                }
                None => {
                    let ticket = state.scheduler.obtain_ticket(2);
                    *current_ticket = Some(ticket);
                    ticket
                }
            }
        };
        SuspendedTask::new(Arc::clone(this) as Arc<dyn Resolver>, ticket)
    }
}

impl Resolver for Dispatcher {
    fn duplicate_ticket(&self, ticket: Ticket) -> Ticket {
        let mut state = self.state.lock().unwrap();
        state.scheduler.duplicate_ticket(ticket);
        ticket
    }

    fn resolve_ticket(&self, ticket: Ticket, resume_task: bool) {
        let mut do_wake = false;
        let abandoned;
        {
            let mut state = self.state.lock().unwrap();
            abandoned = if resume_task {
                state.scheduler.resume_task_with_ticket(ticket);
                None
            } else {
                state.scheduler.release_ticket(ticket)
            };

            // Wake the loop if it sleeps and either gained work or ran out
            // of suspended tasks to wait for. After shutdown there is no
            // loop left to wake.
            if !state.was_shutdown
                && state.need_wake
                && (state.scheduler.has_runnable_tasks()
                    || !state.scheduler.has_suspended_tasks())
            {
                state.need_wake = false;
                do_wake = true;
            }
        }

        if do_wake {
            self.wake.notify_one();
        }
        drop(abandoned);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // By the time the last owner lets go, shutdown has run and every
        // ticket has been resolved.
        let Ok(state) = self.state.lock() else {
            return;
        };
        debug_assert!(state.was_shutdown);
        debug_assert!(!state.scheduler.has_runnable_tasks());
        debug_assert!(!state.scheduler.has_suspended_tasks());
        debug_assert!(!state.scheduler.has_outstanding_tickets());
    }
}

// === impl ContextImpl ===

impl Context for ContextImpl<'_> {
    fn executor(&self) -> &dyn Executor {
        self.executor
    }

    fn suspend_task(&mut self) -> SuspendedTask {
        Dispatcher::suspend_current_task(&self.executor.dispatcher, &mut self.current_ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_result::AsyncResult;
    use crate::loom;
    use crate::promise::make_promise;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::mpsc;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    fn counters<const N: usize>() -> [Arc<AtomicU64>; N] {
        core::array::from_fn(|_| Arc::new(AtomicU64::new(0)))
    }

    fn count(counter: &Arc<AtomicU64>) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Sets a flag when dropped; used to observe task destruction.
    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::Release);
        }
    }

    #[test]
    fn running_tasks() {
        let executor = SingleThreadedExecutor::new();
        let cnt = counters::<3>();

        // A task that runs once and bumps a counter.
        let c0 = Arc::clone(&cnt[0]);
        executor.schedule_task(PendingTask::new(make_promise(move |_cx| {
            c0.fetch_add(1, Ordering::Relaxed);
            AsyncResult::<(), ()>::Ok(())
        })));

        // A task that schedules another task through its context.
        let c1 = Arc::clone(&cnt[1]);
        let c2 = Arc::clone(&cnt[2]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                c1.fetch_add(1, Ordering::Relaxed);
                let c2 = Arc::clone(&c2);
                cx.executor().schedule_task(PendingTask::new(make_promise(move |_cx| {
                    c2.fetch_add(1, Ordering::Relaxed);
                    AsyncResult::<(), ()>::Ok(())
                })));
                AsyncResult::<(), ()>::Ok(())
            },
        )));

        assert_eq!(count(&cnt[0]), 0);
        assert_eq!(count(&cnt[1]), 0);
        assert_eq!(count(&cnt[2]), 0);

        // All tasks run to completion, including the newly scheduled one.
        executor.run();
        assert_eq!(count(&cnt[0]), 1);
        assert_eq!(count(&cnt[1]), 1);
        assert_eq!(count(&cnt[2]), 1);
    }

    #[test]
    fn suspending_and_resuming_tasks() {
        let _trace = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .set_default();

        let executor = SingleThreadedExecutor::new();
        let run_cnt = counters::<5>();
        let resume_cnt = counters::<5>();

        // A task that suspends itself and immediately resumes.
        let (runs, resumes) = (Arc::clone(&run_cnt[0]), Arc::clone(&resume_cnt[0]));
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                if runs.fetch_add(1, Ordering::Relaxed) + 1 == 100 {
                    return AsyncResult::<(), ()>::Ok(());
                }
                resumes.fetch_add(1, Ordering::Relaxed);
                cx.suspend_task().resume_task();
                AsyncResult::Pending
            },
        )));

        // A task that schedules another task to resume it.
        let (runs, resumes) = (Arc::clone(&run_cnt[1]), Arc::clone(&resume_cnt[1]));
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                if runs.fetch_add(1, Ordering::Relaxed) + 1 == 100 {
                    return AsyncResult::<(), ()>::Ok(());
                }

                let resumes = Arc::clone(&resumes);
                let mut suspended = cx.suspend_task();
                cx.executor().schedule_task(PendingTask::new(make_promise(move |_cx| {
                    resumes.fetch_add(1, Ordering::Relaxed);
                    suspended.resume_task();
                    AsyncResult::<(), ()>::Ok(())
                })));
                AsyncResult::Pending
            },
        )));

        // Same, but the resume comes from another thread.
        let (runs, resumes) = (Arc::clone(&run_cnt[2]), Arc::clone(&resume_cnt[2]));
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                if runs.fetch_add(1, Ordering::Relaxed) + 1 == 100 {
                    return AsyncResult::<(), ()>::Ok(());
                }

                let resumes = Arc::clone(&resumes);
                let mut suspended = cx.suspend_task();
                std::thread::spawn(move || {
                    resumes.fetch_add(1, Ordering::Relaxed);
                    suspended.resume_task();
                });
                AsyncResult::Pending
            },
        )));

        // A task that suspends itself but completes anyway, so it only runs
        // once.
        let runs = Arc::clone(&run_cnt[3]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                runs.fetch_add(1, Ordering::Relaxed);
                let _ = cx.suspend_task();
                AsyncResult::<(), ()>::Ok(())
            },
        )));

        // A task that races two threads to resume it; either may win.
        let runs = Arc::clone(&run_cnt[4]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                if runs.fetch_add(1, Ordering::Relaxed) + 1 == 100 {
                    return AsyncResult::<(), ()>::Ok(());
                }

                for _ in 0..2 {
                    let mut suspended = cx.suspend_task();
                    std::thread::spawn(move || {
                        suspended.resume_task();
                    });
                }
                AsyncResult::Pending
            },
        )));

        executor.run();
        assert_eq!(count(&run_cnt[0]), 100);
        assert_eq!(count(&resume_cnt[0]), 99);
        assert_eq!(count(&run_cnt[1]), 100);
        assert_eq!(count(&resume_cnt[1]), 99);
        assert_eq!(count(&run_cnt[2]), 100);
        assert_eq!(count(&resume_cnt[2]), 99);
        assert_eq!(count(&run_cnt[3]), 1);
        assert_eq!(count(&resume_cnt[3]), 0);
        assert_eq!(count(&run_cnt[4]), 100);
    }

    #[test]
    fn abandoning_tasks() {
        let executor = SingleThreadedExecutor::new();
        let run_cnt = counters::<4>();

        // Pending without suspending: abandoned immediately.
        let runs = Arc::clone(&run_cnt[0]);
        executor.schedule_task(PendingTask::new(make_promise(move |_cx| {
            runs.fetch_add(1, Ordering::Relaxed);
            AsyncResult::<(), ()>::Pending
        })));

        // The suspended-task handle is dropped on the floor.
        let runs = Arc::clone(&run_cnt[1]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                runs.fetch_add(1, Ordering::Relaxed);
                let _ = cx.suspend_task();
                AsyncResult::<(), ()>::Pending
            },
        )));

        // The handle is dropped from another thread.
        let runs = Arc::clone(&run_cnt[2]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                runs.fetch_add(1, Ordering::Relaxed);
                let suspended = cx.suspend_task();
                std::thread::spawn(move || drop(suspended));
                AsyncResult::<(), ()>::Pending
            },
        )));

        // Several handles, all dropped.
        let runs = Arc::clone(&run_cnt[3]);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                runs.fetch_add(1, Ordering::Relaxed);
                let _handles = [cx.suspend_task(), cx.suspend_task(), cx.suspend_task()];
                AsyncResult::<(), ()>::Pending
            },
        )));

        // Every task ran exactly once and the loop terminated.
        executor.run();
        assert_eq!(count(&run_cnt[0]), 1);
        assert_eq!(count(&run_cnt[1]), 1);
        assert_eq!(count(&run_cnt[2]), 1);
        assert_eq!(count(&run_cnt[3]), 1);
    }

    #[test]
    fn abandoned_task_is_destroyed() {
        let executor = SingleThreadedExecutor::new();
        let destroyed = Arc::new(AtomicBool::new(false));

        let guard = SetOnDrop(Arc::clone(&destroyed));
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                let _guard = &guard;
                drop(cx.suspend_task());
                AsyncResult::<(), ()>::Pending
            },
        )));

        executor.run();
        assert!(destroyed.load(Ordering::Acquire));
    }

    #[test]
    fn tasks_are_destroyed_at_shutdown() {
        let executor = SingleThreadedExecutor::new();
        let destroyed = Arc::new(AtomicBool::new(false));

        let guard = SetOnDrop(Arc::clone(&destroyed));
        executor.schedule_task(PendingTask::new(make_promise(move |_cx| {
            let _guard = &guard;
            AsyncResult::<(), ()>::Ok(())
        })));

        // Dropped without ever running.
        drop(executor);
        assert!(destroyed.load(Ordering::Acquire));
    }

    #[test]
    fn handles_may_outlive_the_executor() {
        let (tx, rx) = mpsc::channel();
        let executor = SingleThreadedExecutor::new();
        let completed = Arc::new(AtomicBool::new(false));

        let done = Arc::clone(&completed);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                if done.load(Ordering::Relaxed) {
                    return AsyncResult::<(), ()>::Ok(());
                }
                done.store(true, Ordering::Relaxed);

                // Stash one handle outside, use another to resume ourselves.
                tx.send(cx.suspend_task()).unwrap();
                cx.suspend_task().resume_task();
                AsyncResult::Pending
            },
        )));

        executor.run();
        assert!(completed.load(Ordering::Acquire));
        drop(executor);

        // The stashed handle still resolves cleanly against the dispatcher
        // of the long-gone executor.
        let mut stashed = rx.recv().unwrap();
        stashed.resume_task();
    }

    #[test]
    fn executor_identity_is_visible_to_tasks() {
        let executor = SingleThreadedExecutor::new();
        let executor_addr = std::ptr::from_ref(&executor) as usize;
        let observed = Arc::new(AtomicBool::new(false));

        let seen = Arc::clone(&observed);
        executor.schedule_task(PendingTask::new(make_promise(
            move |cx: &mut dyn Context| {
                let ctx_executor =
                    (cx.executor() as *const dyn Executor).cast::<()>() as usize;
                seen.store(ctx_executor == executor_addr, Ordering::Release);
                AsyncResult::<(), ()>::Ok(())
            },
        )));

        executor.run();
        assert!(observed.load(Ordering::Acquire));
    }

    type JoinHandles = std::sync::Mutex<Vec<loom::thread::JoinHandle<()>>>;

    #[test]
    fn loom_cross_thread_resume() {
        loom::model(|| {
            let executor = SingleThreadedExecutor::new();
            let polls = Arc::new(AtomicU64::new(0));
            let helpers: Arc<JoinHandles> = Arc::default();

            let count = Arc::clone(&polls);
            let spawned = Arc::clone(&helpers);
            executor.schedule_task(PendingTask::new(make_promise(
                move |cx: &mut dyn Context| {
                    if count.fetch_add(1, Ordering::Relaxed) == 0 {
                        let mut suspended = cx.suspend_task();
                        spawned.lock().unwrap().push(loom::thread::spawn(move || {
                            suspended.resume_task();
                        }));
                        AsyncResult::Pending
                    } else {
                        AsyncResult::<(), ()>::Ok(())
                    }
                },
            )));

            executor.run();
            assert_eq!(polls.load(Ordering::Relaxed), 2);
            for handle in helpers.lock().unwrap().drain(..) {
                handle.join().unwrap();
            }
        });
    }

    #[test]
    fn loom_resume_races_drop() {
        loom::model(|| {
            let executor = SingleThreadedExecutor::new();
            let polls = Arc::new(AtomicU64::new(0));
            let helpers: Arc<JoinHandles> = Arc::default();

            let count = Arc::clone(&polls);
            let spawned = Arc::clone(&helpers);
            executor.schedule_task(PendingTask::new(make_promise(
                move |cx: &mut dyn Context| {
                    if count.fetch_add(1, Ordering::Relaxed) == 0 {
                        let mut resumer = cx.suspend_task();
                        let dropper = resumer.clone();
                        let mut spawned = spawned.lock().unwrap();
                        spawned.push(loom::thread::spawn(move || {
                            resumer.resume_task();
                        }));
                        spawned.push(loom::thread::spawn(move || {
                            drop(dropper);
                        }));
                        AsyncResult::Pending
                    } else {
                        AsyncResult::<(), ()>::Ok(())
                    }
                },
            )));

            // Whatever the interleaving, the resume wins over the drop and
            // the task completes.
            executor.run();
            assert_eq!(polls.load(Ordering::Relaxed), 2);
            for handle in helpers.lock().unwrap().drain(..) {
                handle.join().unwrap();
            }
        });
    }
}

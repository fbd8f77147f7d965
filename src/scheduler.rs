// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Task and ticket bookkeeping for executors.
//!
//! The [`Scheduler`] is the low-level building block an executor drives: a
//! FIFO queue of runnable tasks plus a table of suspended tasks keyed by
//! reference-counted tickets. It is not thread-safe; the executor is
//! responsible for all synchronization. For a concrete executor, see
//! [`SingleThreadedExecutor`](crate::SingleThreadedExecutor).

use crate::pending_task::PendingTask;
use crate::suspended_task::Ticket;
use std::collections::{BTreeMap, VecDeque};

/// The queue type used to hand batches of tasks between the scheduler and an
/// executor.
pub type TaskQueue = VecDeque<PendingTask>;

/// Tracks runnable and suspended tasks.
#[derive(Debug, Default)]
pub struct Scheduler {
    runnable_tasks: TaskQueue,
    tickets: BTreeMap<Ticket, TicketRecord>,
    suspended_task_count: u64,
    next_ticket: u64,
}

#[derive(Debug)]
struct TicketRecord {
    ref_count: u32,
    was_resumed: bool,
    /// Empty when the ticket is obtained; filled by `finalize_ticket` if the
    /// task suspends; emptied again when the task is resumed, released or
    /// taken.
    task: Option<PendingTask>,
}

// === impl Scheduler ===

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runnable_tasks: TaskQueue::new(),
            tickets: BTreeMap::new(),
            suspended_task_count: 0,
            next_ticket: 1,
        }
    }

    /// Adds a task to the runnable queue.
    pub fn schedule_task(&mut self, task: PendingTask) {
        debug_assert!(!task.is_empty());
        self.runnable_tasks.push_back(task);
    }

    /// Allocates a new ticket with a reference count of `initial_refs`.
    ///
    /// The executor must eventually call [`finalize_ticket`] to record the
    /// disposition of the task the ticket was obtained for.
    ///
    /// # Panics
    ///
    /// Panics if `initial_refs` is zero.
    ///
    /// [`finalize_ticket`]: Scheduler::finalize_ticket
    pub fn obtain_ticket(&mut self, initial_refs: u32) -> Ticket {
        assert!(initial_refs >= 1);

        let ticket = Ticket::from_u64(self.next_ticket);
        self.next_ticket += 1;
        tracing::trace!(ticket = %ticket, initial_refs, "ticket obtained");
        self.tickets.insert(
            ticket,
            TicketRecord {
                ref_count: initial_refs,
                was_resumed: false,
                task: None,
            },
        );
        ticket
    }

    /// Updates a ticket after one run of its task's continuation, consuming
    /// the reference retained by [`obtain_ticket`].
    ///
    /// `task` is `None` if the task completed during the run. Otherwise the
    /// task returned pending and its fate depends on the ticket:
    ///
    /// - already resumed: the task goes straight back onto the runnable
    ///   queue;
    /// - still referenced: the task moves into the ticket's slot, suspended;
    /// - otherwise the task was abandoned, and it is handed back to the
    ///   caller for destruction.
    ///
    /// # Panics
    ///
    /// Panics if the ticket has already been finalized.
    ///
    /// [`obtain_ticket`]: Scheduler::obtain_ticket
    pub fn finalize_ticket(
        &mut self,
        ticket: Ticket,
        task: Option<PendingTask>,
    ) -> Option<PendingTask> {
        let record = self
            .tickets
            .get_mut(&ticket)
            .expect("finalized an unknown ticket");
        assert!(record.task.is_none());
        assert!(record.ref_count > 0);

        record.ref_count -= 1;
        let mut abandoned = None;
        match task {
            None => {
                // task already finished
            }
            Some(task) if record.was_resumed => {
                tracing::trace!(ticket = %ticket, "task resumed during its own run");
                self.runnable_tasks.push_back(task);
            }
            Some(task) if record.ref_count > 0 => {
                tracing::trace!(ticket = %ticket, "task suspended");
                record.task = Some(task);
                self.suspended_task_count += 1;
            }
            Some(task) => {
                tracing::trace!(ticket = %ticket, "task abandoned at finalization");
                abandoned = Some(task);
            }
        }

        if self.tickets[&ticket].ref_count == 0 {
            self.tickets.remove(&ticket);
        }
        abandoned
    }

    /// Increments the ticket's reference count.
    ///
    /// # Panics
    ///
    /// Panics if the ticket does not exist.
    pub fn duplicate_ticket(&mut self, ticket: Ticket) {
        let record = self
            .tickets
            .get_mut(&ticket)
            .expect("duplicated an unknown ticket");
        assert!(record.ref_count > 0);
        record.ref_count += 1;
    }

    /// Decrements the ticket's reference count.
    ///
    /// Releasing the last reference of a ticket whose task was never resumed
    /// returns the suspended task to the caller, which is then responsible
    /// for destroying it.
    ///
    /// # Panics
    ///
    /// Panics if the ticket does not exist.
    pub fn release_ticket(&mut self, ticket: Ticket) -> Option<PendingTask> {
        let record = self
            .tickets
            .get_mut(&ticket)
            .expect("released an unknown ticket");
        assert!(record.ref_count > 0);

        record.ref_count -= 1;
        if record.ref_count > 0 {
            return None;
        }

        let task = record.task.take();
        if task.is_some() {
            debug_assert!(self.suspended_task_count > 0);
            self.suspended_task_count -= 1;
            tracing::trace!(ticket = %ticket, "task abandoned");
        }
        self.tickets.remove(&ticket);
        task
    }

    /// Resumes the ticket's task and decrements the reference count.
    ///
    /// Returns true if a task actually moved to the runnable queue. Resuming
    /// a ticket that was already resumed, or whose slot holds no task, only
    /// consumes the reference.
    ///
    /// # Panics
    ///
    /// Panics if the ticket does not exist.
    pub fn resume_task_with_ticket(&mut self, ticket: Ticket) -> bool {
        let record = self
            .tickets
            .get_mut(&ticket)
            .expect("resumed an unknown ticket");
        assert!(record.ref_count > 0);

        let mut did_resume = false;
        record.ref_count -= 1;
        if !record.was_resumed {
            record.was_resumed = true;
            if let Some(task) = record.task.take() {
                did_resume = true;
                debug_assert!(self.suspended_task_count > 0);
                self.suspended_task_count -= 1;
                self.runnable_tasks.push_back(task);
                tracing::trace!(ticket = %ticket, "task resumed");
            }
        }

        if self.tickets[&ticket].ref_count == 0 {
            self.tickets.remove(&ticket);
        }
        did_resume
    }

    /// Drains the runnable queue into `tasks`.
    pub fn take_runnable_tasks(&mut self, tasks: &mut TaskQueue) {
        debug_assert!(tasks.is_empty());
        std::mem::swap(&mut self.runnable_tasks, tasks);
    }

    /// Drains every remaining task, runnable or suspended, into `tasks`.
    ///
    /// This is a shutdown operation. Ticket records with outstanding
    /// references remain in the table (their references are owned by
    /// [`SuspendedTask`](crate::SuspendedTask) handles elsewhere), but their
    /// slots are emptied, so resuming them later only consumes references.
    pub fn take_all_tasks(&mut self, tasks: &mut TaskQueue) {
        debug_assert!(tasks.is_empty());

        std::mem::swap(&mut self.runnable_tasks, tasks);
        if self.suspended_task_count > 0 {
            for record in self.tickets.values_mut() {
                if let Some(task) = record.task.take() {
                    debug_assert!(self.suspended_task_count > 0);
                    self.suspended_task_count -= 1;
                    tasks.push_back(task);
                }
            }
        }
        debug_assert_eq!(self.suspended_task_count, 0);
    }

    /// Returns true if any task sits in the runnable queue.
    #[must_use]
    pub fn has_runnable_tasks(&self) -> bool {
        !self.runnable_tasks.is_empty()
    }

    /// Returns true if any suspended task has yet to be resumed.
    #[must_use]
    pub fn has_suspended_tasks(&self) -> bool {
        self.suspended_task_count > 0
    }

    /// Returns true if any ticket has yet to be fully resolved.
    #[must_use]
    pub fn has_outstanding_tickets(&self) -> bool {
        !self.tickets.is_empty()
    }
}

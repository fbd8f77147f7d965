// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A wrapper around the Linux io_uring submission/completion rings.
//!
//! [`IoUring::new`] performs the setup syscall and maps both rings into the
//! process, shared read-write with the kernel. Submissions are batched
//! user-side: [`get_submission_entry`](IoUring::get_submission_entry) hands
//! out SQE slots that stay invisible to the kernel until
//! [`submit`](IoUring::submit) publishes the whole batch with a single tail
//! store. Completions are retrieved with
//! [`get_completion_entry`](IoUring::get_completion_entry) /
//! [`peek_completion_entry`](IoUring::peek_completion_entry) and retired
//! with [`seen`](IoUring::seen).
//!
//! Buffers, file tables and eventfds can be pre-registered with the kernel
//! through the `register_*` methods to shave per-operation costs.
//!
//! # Buffer lifetimes
//!
//! SQEs carry raw addresses. Memory handed to a preparation helper (iovecs,
//! fixed buffers, msghdrs) must stay valid and unmoved until the matching
//! completion has been reaped; the kernel reads and writes it asynchronously
//! after [`submit`](IoUring::submit) returns.
//!
//! # Sharing protocol
//!
//! Each ring field has a single writer: the user side owns the SQ tail and
//! CQ head, the kernel owns the SQ head, CQ tail and the flag/overflow
//! counters. The counters are accessed only with acquire/release atomics,
//! which is the entire synchronization protocol; no locks, no stronger
//! fences.

pub mod sys;

use crate::error::Errno;
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use static_assertions::assert_impl_all;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

pub use sys::{Cqe, FsyncFlags, SetupFlags, Sqe, SqeFlags};

use sys::{EnterFlags, IoUringParams, SqRingFlags};

/// The user-configurable subset of the ring setup parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Params {
    /// Setup flags; [`SetupFlags::SQPOLL`] enables kernel-side submission
    /// polling.
    pub flags: SetupFlags,
    /// CPU to pin the poll thread to, with [`SetupFlags::SQ_AFF`].
    pub sq_thread_cpu: u32,
    /// Poll thread idle time before it sleeps, in milliseconds.
    pub sq_thread_idle: u32,
}

/// An io_uring instance: the ring fd plus both shared-memory rings.
pub struct IoUring {
    ring_fd: OwnedFd,
    flags: SetupFlags,
    sq: SubmissionQueue,
    cq: CompletionQueue,
}

assert_impl_all!(IoUring: Send);

/// The submission ring.
///
/// The kernel owns `head`; the user side owns `tail`, the indirection
/// `array` and the SQE bodies. On top of the kernel-visible ring the queue
/// keeps user-side `sqe_head`/`sqe_tail` cursors so that prepared SQEs are
/// only published on submit.
struct SubmissionQueue {
    ktail: *const AtomicU32,
    kflags: *const AtomicU32,
    kdropped: *const AtomicU32,
    array: *mut u32,
    sqes: *mut Sqe,
    ring_mask: u32,
    ring_entries: u32,
    sqe_head: u32,
    sqe_tail: u32,
    /// Keep the mappings alive as long as the pointers above are.
    _ring: Mmap,
    _sqe_ring: Mmap,
}

// Safety: the queue is accessed through `&mut` for all mutation and the
// kernel-shared counters are only touched atomically, so moving it to
// another thread is fine.
unsafe impl Send for SubmissionQueue {}

/// The completion ring.
///
/// The kernel owns `tail` and the `overflow` counter; the user side owns
/// `head`. The CQE array lives inside the same mapping.
struct CompletionQueue {
    khead: *const AtomicU32,
    ktail: *const AtomicU32,
    koverflow: *const AtomicU32,
    cqes: *const Cqe,
    ring_mask: u32,
    ring_entries: u32,
    /// Keeps the mapping alive as long as the pointers above are.
    _ring: Mmap,
}

// Safety: as for `SubmissionQueue`.
unsafe impl Send for CompletionQueue {}

/// A shared read-write mapping of one of the ring regions, unmapped on drop.
struct Mmap {
    ptr: *mut libc::c_void,
    len: usize,
}

// === impl Mmap ===

impl Mmap {
    fn map(fd: BorrowedFd<'_>, len: usize, offset: i64) -> Result<Self, Errno> {
        // Safety: we ask for a fresh shared mapping of the ring fd at one of
        // the fixed ring offsets; the kernel validates `len` and `offset`.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Errno::last_os_error());
        }
        Ok(Self { ptr, len })
    }

    /// Pointer `off` bytes into the mapping.
    fn offset(&self, off: u32) -> *mut u8 {
        debug_assert!((off as usize) < self.len);
        // Safety: bounds asserted above; the mapping is at least `len`
        // bytes.
        unsafe { self.ptr.cast::<u8>().add(off as usize) }
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        // Safety: `ptr`/`len` describe exactly the mapping established in
        // `map`.
        let ret = unsafe { libc::munmap(self.ptr, self.len) };
        debug_assert_eq!(ret, 0);
    }
}

// === impl SubmissionQueue ===

impl SubmissionQueue {
    fn new(fd: BorrowedFd<'_>, p: &IoUringParams) -> Result<Self, Errno> {
        let ring_len = p.sq_off.array as usize + p.sq_entries as usize * mem::size_of::<u32>();
        let ring = Mmap::map(fd, ring_len, sys::IORING_OFF_SQ_RING)?;
        let sqe_ring = Mmap::map(fd, p.sq_entries as usize * mem::size_of::<Sqe>(), sys::IORING_OFF_SQES)?;

        // Safety: the kernel-published offsets land on naturally aligned
        // u32 fields inside the ring mapping.
        let (ring_mask, ring_entries) = unsafe {
            (
                *ring.offset(p.sq_off.ring_mask).cast::<u32>(),
                *ring.offset(p.sq_off.ring_entries).cast::<u32>(),
            )
        };
        debug_assert!(ring_entries.is_power_of_two());
        debug_assert_eq!(ring_mask, ring_entries - 1);

        Ok(Self {
            ktail: ring.offset(p.sq_off.tail).cast::<AtomicU32>(),
            kflags: ring.offset(p.sq_off.flags).cast::<AtomicU32>(),
            kdropped: ring.offset(p.sq_off.dropped).cast::<AtomicU32>(),
            array: ring.offset(p.sq_off.array).cast::<u32>(),
            sqes: sqe_ring.ptr.cast::<Sqe>(),
            ring_mask,
            ring_entries,
            sqe_head: 0,
            sqe_tail: 0,
            _ring: ring,
            _sqe_ring: sqe_ring,
        })
    }

    /// Hands out the next free SQE slot, or `None` when the user-side ring
    /// is full.
    fn next_sqe(&mut self) -> Option<&mut Sqe> {
        let next = self.sqe_tail.wrapping_add(1);
        if next.wrapping_sub(self.sqe_head) > self.ring_entries {
            return None;
        }

        // Safety: the masked index stays within the SQE array.
        let sqe = unsafe { &mut *self.sqes.add((self.sqe_tail & self.ring_mask) as usize) };
        self.sqe_tail = next;
        Some(sqe)
    }

    /// Publishes all prepared SQEs to the kernel and returns how many.
    ///
    /// Writes each batched SQE's index into the indirection array, then
    /// releases the new tail so the kernel observes the bodies and the
    /// indices before the tail bump.
    fn flush(&mut self) -> u32 {
        let to_submit = self.sqe_tail.wrapping_sub(self.sqe_head);
        if to_submit == 0 {
            return 0;
        }

        let mask = self.ring_mask;
        // Safety: we are the only writer of `ktail`; a relaxed read sees our
        // own last store.
        let mut ktail = unsafe { (*self.ktail).load(Ordering::Relaxed) };
        for _ in 0..to_submit {
            // Safety: the masked index stays within the indirection array.
            unsafe {
                *self.array.add((ktail & mask) as usize) = self.sqe_head & mask;
            }
            ktail = ktail.wrapping_add(1);
            self.sqe_head = self.sqe_head.wrapping_add(1);
        }

        // Safety: `ktail` points at the shared tail counter.
        unsafe {
            (*self.ktail).store(ktail, Ordering::Release);
        }
        tracing::trace!(submitted = to_submit, "published sqes");
        to_submit
    }

    fn needs_wakeup(&self) -> bool {
        // Safety: `kflags` points at the shared flags word, written only by
        // the kernel.
        let flags = unsafe { (*self.kflags).load(Ordering::Relaxed) };
        SqRingFlags::from_bits_truncate(flags).contains(SqRingFlags::NEED_WAKEUP)
    }

    fn dropped(&self) -> u32 {
        // Safety: `kdropped` points at the shared dropped counter.
        unsafe { (*self.kdropped).load(Ordering::Relaxed) }
    }
}

// === impl CompletionQueue ===

impl CompletionQueue {
    fn new(fd: BorrowedFd<'_>, p: &IoUringParams) -> Result<Self, Errno> {
        let ring_len = p.cq_off.cqes as usize + p.cq_entries as usize * mem::size_of::<Cqe>();
        let ring = Mmap::map(fd, ring_len, sys::IORING_OFF_CQ_RING)?;

        // Safety: as for the submission ring, the published offsets are
        // in-bounds and aligned.
        let (ring_mask, ring_entries) = unsafe {
            (
                *ring.offset(p.cq_off.ring_mask).cast::<u32>(),
                *ring.offset(p.cq_off.ring_entries).cast::<u32>(),
            )
        };

        Ok(Self {
            khead: ring.offset(p.cq_off.head).cast::<AtomicU32>(),
            ktail: ring.offset(p.cq_off.tail).cast::<AtomicU32>(),
            koverflow: ring.offset(p.cq_off.overflow).cast::<AtomicU32>(),
            cqes: ring.offset(p.cq_off.cqes).cast::<Cqe>(),
            ring_mask,
            ring_entries,
            _ring: ring,
        })
    }

    /// Returns true if a completion is waiting.
    ///
    /// The acquire load of the kernel-owned tail pairs with the kernel's
    /// release store, making the CQE contents visible before the tail moves.
    fn has_entry(&self) -> bool {
        // Safety: `khead` is only written by us, `ktail` only by the kernel;
        // both point at the shared counters.
        unsafe {
            (*self.ktail).load(Ordering::Acquire) != (*self.khead).load(Ordering::Relaxed)
        }
    }

    /// The completion at the current head. Only meaningful after
    /// [`has_entry`](Self::has_entry) returned true.
    fn head_entry(&self) -> &Cqe {
        // Safety: the head counter is ours alone, and the masked index stays
        // within the CQE array.
        unsafe {
            let head = (*self.khead).load(Ordering::Relaxed);
            &*self.cqes.add((head & self.ring_mask) as usize)
        }
    }

    /// Hands `n` consumed completions back to the kernel.
    fn advance(&mut self, n: u32) {
        // Safety: `khead` points at the shared head counter. The release
        // pairs with the kernel's acquire, ordering our CQE reads before the
        // slots are recycled.
        unsafe {
            (*self.khead).fetch_add(n, Ordering::Release);
        }
    }

    fn overflow(&self) -> u32 {
        // Safety: `koverflow` points at the shared overflow counter.
        unsafe { (*self.koverflow).load(Ordering::Relaxed) }
    }
}

// === impl IoUring ===

impl IoUring {
    /// Sets up a ring with at least `entries` submission slots and default
    /// parameters.
    pub fn new(entries: u32) -> Result<Self, Errno> {
        Self::with_params(entries, &Params::default())
    }

    /// Sets up a ring, requesting the given [`Params`].
    pub fn with_params(entries: u32, params: &Params) -> Result<Self, Errno> {
        let mut p = IoUringParams {
            flags: params.flags.bits(),
            sq_thread_cpu: params.sq_thread_cpu,
            sq_thread_idle: params.sq_thread_idle,
            ..IoUringParams::default()
        };

        let ring_fd = sys::io_uring_setup(entries, &mut p)?;
        let sq = SubmissionQueue::new(ring_fd.as_fd(), &p)?;
        let cq = CompletionQueue::new(ring_fd.as_fd(), &p)?;
        tracing::debug!(
            sq_entries = p.sq_entries,
            cq_entries = p.cq_entries,
            flags = ?params.flags,
            "ring established"
        );

        Ok(Self {
            ring_fd,
            flags: params.flags,
            sq,
            cq,
        })
    }

    /// The number of submission slots in the ring.
    #[must_use]
    pub fn sq_entries(&self) -> u32 {
        self.sq.ring_entries
    }

    /// The number of completion slots in the ring.
    #[must_use]
    pub fn cq_entries(&self) -> u32 {
        self.cq.ring_entries
    }

    /// Submissions the kernel rejected as invalid.
    #[must_use]
    pub fn sq_dropped(&self) -> u32 {
        self.sq.dropped()
    }

    /// Completions lost to a full completion ring.
    #[must_use]
    pub fn cq_overflow(&self) -> u32 {
        self.cq.overflow()
    }

    /// Returns a vacant SQE to fill in place, or `None` when the ring is
    /// full.
    ///
    /// The entry is not visible to the kernel until [`submit`](Self::submit)
    /// is called; any number of entries may be prepared before one submit
    /// publishes the batch.
    pub fn get_submission_entry(&mut self) -> Option<&mut Sqe> {
        self.sq.next_sqe()
    }

    /// Publishes all prepared SQEs to the kernel.
    ///
    /// With `wait > 0` the call also waits until that many completions
    /// (capped at the number submitted) are available. Whether the kernel
    /// has to be entered at all depends on the mode: always without
    /// `SQPOLL`; with `SQPOLL` only when the poll thread went idle and
    /// needs a wakeup, or when waiting was requested.
    ///
    /// Returns the number of SQEs submitted.
    pub fn submit(&mut self, wait: u32) -> Result<u32, Errno> {
        let submitted = self.sq.flush();
        if submitted == 0 {
            return Ok(0);
        }

        let mut flags = EnterFlags::empty();
        let wait = wait.min(submitted);
        if wait > 0 || self.needs_enter(&mut flags) {
            if wait > 0 {
                flags |= EnterFlags::GETEVENTS;
            }
            sys::io_uring_enter(self.ring_fd.as_fd(), submitted, wait, flags)?;
        }
        Ok(submitted)
    }

    /// Returns the oldest unconsumed completion.
    ///
    /// With `wait` set, blocks in the kernel until a completion arrives.
    /// Otherwise fails with `EAGAIN` when the completion ring is empty.
    ///
    /// The returned entry stays in the ring; call [`seen`](Self::seen) after
    /// copying out whatever is needed.
    pub fn get_completion_entry(&mut self, wait: bool) -> Result<&Cqe, Errno> {
        loop {
            if self.cq.has_entry() {
                return Ok(self.cq.head_entry());
            }
            if !wait {
                return Err(Errno::new(libc::EAGAIN));
            }
            sys::io_uring_enter(self.ring_fd.as_fd(), 0, 1, EnterFlags::GETEVENTS)?;
        }
    }

    /// The non-blocking form of [`get_completion_entry`](Self::get_completion_entry).
    pub fn peek_completion_entry(&mut self) -> Result<&Cqe, Errno> {
        self.get_completion_entry(false)
    }

    /// Marks `n` completions as consumed, recycling their ring slots.
    pub fn seen(&mut self, n: u32) {
        self.cq.advance(n);
    }

    /// Registers `iovecs` as fixed buffers for `read_fixed`/`write_fixed`.
    pub fn register_buffer(&self, iovecs: &[libc::iovec]) -> Result<(), Errno> {
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_REGISTER_BUFFERS,
            iovecs.as_ptr().cast(),
            iovecs.len() as u32,
        )
    }

    pub fn unregister_buffer(&self) -> Result<(), Errno> {
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_UNREGISTER_BUFFERS,
            ptr::null(),
            0,
        )
    }

    /// Registers a file table for [`SqeFlags::FIXED_FILE`] operations.
    pub fn register_files(&self, files: &[RawFd]) -> Result<(), Errno> {
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_REGISTER_FILES,
            files.as_ptr().cast(),
            files.len() as u32,
        )
    }

    pub fn unregister_files(&self) -> Result<(), Errno> {
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_UNREGISTER_FILES,
            ptr::null(),
            0,
        )
    }

    /// Registers an eventfd to be signalled on every completion.
    pub fn register_eventfd(&self, event_fd: BorrowedFd<'_>) -> Result<(), Errno> {
        let raw = event_fd.as_raw_fd();
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_REGISTER_EVENTFD,
            ptr::from_ref(&raw).cast(),
            1,
        )
    }

    pub fn unregister_eventfd(&self) -> Result<(), Errno> {
        sys::io_uring_register(
            self.ring_fd.as_fd(),
            sys::IORING_UNREGISTER_EVENTFD,
            ptr::null(),
            0,
        )
    }

    /// Whether submit has to enter the kernel: always when nobody else
    /// submits for us, and in `SQPOLL` mode whenever the poll thread went to
    /// sleep (in which case the wakeup flag is added).
    fn needs_enter(&self, flags: &mut EnterFlags) -> bool {
        if !self.flags.contains(SetupFlags::SQPOLL) {
            return true;
        }
        if self.sq.needs_wakeup() {
            *flags |= EnterFlags::SQ_WAKEUP;
            return true;
        }
        false
    }
}

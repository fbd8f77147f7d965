// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The raw io_uring kernel ABI: record layouts, constants and the three
//! syscalls.
//!
//! Everything here matches the kernel's published interface byte for byte;
//! the ring offsets are never hard-coded and always come out of the
//! [`IoUringParams`] the kernel fills in during setup.

use crate::error::Errno;
use bitflags::bitflags;
use core::ffi::c_void;
use core::ptr;
use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Fixed mmap offsets selecting which ring a mapping refers to.
pub(crate) const IORING_OFF_SQ_RING: i64 = 0;
pub(crate) const IORING_OFF_CQ_RING: i64 = 0x800_0000;
pub(crate) const IORING_OFF_SQES: i64 = 0x1000_0000;

/// SQE opcodes.
pub(crate) const IORING_OP_NOP: u8 = 0;
pub(crate) const IORING_OP_READV: u8 = 1;
pub(crate) const IORING_OP_WRITEV: u8 = 2;
pub(crate) const IORING_OP_FSYNC: u8 = 3;
pub(crate) const IORING_OP_READ_FIXED: u8 = 4;
pub(crate) const IORING_OP_WRITE_FIXED: u8 = 5;
pub(crate) const IORING_OP_POLL_ADD: u8 = 6;
pub(crate) const IORING_OP_POLL_REMOVE: u8 = 7;
pub(crate) const IORING_OP_SYNC_FILE_RANGE: u8 = 8;
pub(crate) const IORING_OP_SENDMSG: u8 = 9;
pub(crate) const IORING_OP_RECVMSG: u8 = 10;

/// `io_uring_register` opcodes.
pub(crate) const IORING_REGISTER_BUFFERS: u32 = 0;
pub(crate) const IORING_UNREGISTER_BUFFERS: u32 = 1;
pub(crate) const IORING_REGISTER_FILES: u32 = 2;
pub(crate) const IORING_UNREGISTER_FILES: u32 = 3;
pub(crate) const IORING_REGISTER_EVENTFD: u32 = 4;
pub(crate) const IORING_UNREGISTER_EVENTFD: u32 = 5;

bitflags! {
    /// Flags accepted by the setup syscall.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SetupFlags: u32 {
        /// Poll for completions instead of using interrupts.
        const IOPOLL = 1 << 0;
        /// Have a kernel thread poll the submission queue.
        const SQPOLL = 1 << 1;
        /// Pin the poll thread to the CPU given in `sq_thread_cpu`.
        const SQ_AFF = 1 << 2;
    }

    /// Flags for the enter syscall.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct EnterFlags: u32 {
        const GETEVENTS = 1 << 0;
        const SQ_WAKEUP = 1 << 1;
    }

    /// Flags the kernel publishes in the SQ ring's `flags` word.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct SqRingFlags: u32 {
        /// The SQPOLL thread went to sleep and needs an enter to wake up.
        const NEED_WAKEUP = 1 << 0;
    }

    /// Per-SQE modifier flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SqeFlags: u8 {
        /// `fd` is an index into the registered-files table.
        const FIXED_FILE = 1 << 0;
        /// Issue after all prior SQEs have completed.
        const IO_DRAIN = 1 << 1;
        /// The next SQE must not start before this one completes.
        const IO_LINK = 1 << 2;
    }

    /// Flags for the fsync opcode.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct FsyncFlags: u32 {
        /// Behave like `fdatasync` rather than `fsync`.
        const DATASYNC = 1 << 0;
    }
}

/// Offsets of the SQ ring fields within its mapping, published by the
/// kernel.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub(crate) struct SqRingOffsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub flags: u32,
    pub dropped: u32,
    pub array: u32,
    pub resv1: u32,
    pub resv2: u64,
}

/// Offsets of the CQ ring fields within its mapping, published by the
/// kernel.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub(crate) struct CqRingOffsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub overflow: u32,
    pub cqes: u32,
    pub resv: [u64; 2],
}

/// The parameter block exchanged with the setup syscall.
///
/// Callers fill in `flags`, `sq_thread_cpu` and `sq_thread_idle`; the kernel
/// fills in everything else.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub(crate) struct IoUringParams {
    pub sq_entries: u32,
    pub cq_entries: u32,
    pub flags: u32,
    pub sq_thread_cpu: u32,
    pub sq_thread_idle: u32,
    pub features: u32,
    pub wq_fd: u32,
    pub resv: [u32; 3],
    pub sq_off: SqRingOffsets,
    pub cq_off: CqRingOffsets,
}

/// A submission queue entry, laid out exactly as the kernel reads it.
///
/// All preparation helpers first zero the record, so stale fields from a
/// previous occupant of the slot can never leak into a new operation.
/// `user_data` is an opaque cookie returned verbatim in the matching
/// [`Cqe`].
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct Sqe {
    pub opcode: u8,
    pub flags: u8,
    pub ioprio: u16,
    pub fd: RawFd,
    pub off: u64,
    pub addr: u64,
    pub len: u32,
    pub op_flags: u32,
    pub user_data: u64,
    pub buf_index: u16,
    pub personality: u16,
    pub splice_fd_in: i32,
    pub __pad2: [u64; 2],
}

/// A completion queue entry.
///
/// `res` carries the operation's result: a non-negative count or value, or a
/// negated errno on failure.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct Cqe {
    pub user_data: u64,
    pub res: i32,
    pub flags: u32,
}

// === impl Sqe ===

impl Sqe {
    /// Zeroes the whole entry.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn prep_rw(&mut self, opcode: u8, fd: RawFd, addr: u64, len: u32, offset: u64) {
        self.clear();
        self.opcode = opcode;
        self.fd = fd;
        self.off = offset;
        self.addr = addr;
        self.len = len;
    }

    /// Vectored read from `fd` at `offset`.
    pub fn readv(&mut self, fd: RawFd, iovecs: &[libc::iovec], offset: u64) {
        self.prep_rw(
            IORING_OP_READV,
            fd,
            iovecs.as_ptr() as u64,
            iovecs.len() as u32,
            offset,
        );
    }

    /// Vectored write to `fd` at `offset`.
    pub fn writev(&mut self, fd: RawFd, iovecs: &[libc::iovec], offset: u64) {
        self.prep_rw(
            IORING_OP_WRITEV,
            fd,
            iovecs.as_ptr() as u64,
            iovecs.len() as u32,
            offset,
        );
    }

    /// Read into a registered buffer. `buf` must lie within the buffer
    /// registered at `buf_index`.
    pub fn read_fixed(&mut self, fd: RawFd, buf: &mut [u8], offset: u64, buf_index: u16) {
        self.prep_rw(
            IORING_OP_READ_FIXED,
            fd,
            buf.as_mut_ptr() as u64,
            buf.len() as u32,
            offset,
        );
        self.buf_index = buf_index;
    }

    /// Write from a registered buffer. `buf` must lie within the buffer
    /// registered at `buf_index`.
    pub fn write_fixed(&mut self, fd: RawFd, buf: &[u8], offset: u64, buf_index: u16) {
        self.prep_rw(
            IORING_OP_WRITE_FIXED,
            fd,
            buf.as_ptr() as u64,
            buf.len() as u32,
            offset,
        );
        self.buf_index = buf_index;
    }

    /// One-shot poll on `fd`, like `epoll` with `EPOLLONESHOT`.
    pub fn poll_add(&mut self, fd: RawFd, poll_events: u16) {
        self.clear();
        self.opcode = IORING_OP_POLL_ADD;
        self.fd = fd;
        self.op_flags = u32::from(poll_events);
    }

    /// Cancels the pending poll whose SQE carried `user_data`.
    pub fn poll_remove(&mut self, user_data: u64) {
        self.clear();
        self.opcode = IORING_OP_POLL_REMOVE;
        self.addr = user_data;
    }

    /// File sync. With [`FsyncFlags::DATASYNC`] this behaves like
    /// `fdatasync`.
    pub fn fsync(&mut self, fd: RawFd, fsync_flags: FsyncFlags) {
        self.clear();
        self.opcode = IORING_OP_FSYNC;
        self.fd = fd;
        self.op_flags = fsync_flags.bits();
    }

    /// Sync a byte range of the file, see `sync_file_range(2)`.
    pub fn sync_file_range(&mut self, fd: RawFd, offset: u64, nbytes: u32, flags: u32) {
        self.clear();
        self.opcode = IORING_OP_SYNC_FILE_RANGE;
        self.fd = fd;
        self.off = offset;
        self.len = nbytes;
        self.op_flags = flags;
    }

    /// Receive a message on a socket.
    pub fn recvmsg(&mut self, fd: RawFd, msgs: &mut [libc::msghdr]) {
        self.clear();
        self.opcode = IORING_OP_RECVMSG;
        self.fd = fd;
        self.addr = msgs.as_mut_ptr() as u64;
        self.len = msgs.len() as u32;
    }

    /// Send a message on a socket.
    pub fn sendmsg(&mut self, fd: RawFd, msgs: &[libc::msghdr]) {
        self.clear();
        self.opcode = IORING_OP_SENDMSG;
        self.fd = fd;
        self.addr = msgs.as_ptr() as u64;
        self.len = msgs.len() as u32;
    }

    /// No I/O at all; completes with `res == 0`.
    pub fn nop(&mut self) {
        self.clear();
        self.opcode = IORING_OP_NOP;
    }

    /// Sets the opaque cookie returned in the matching completion.
    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    /// ORs modifier flags into the entry.
    pub fn set_flags(&mut self, flags: SqeFlags) {
        self.flags |= flags.bits();
    }
}

// === syscalls ===

pub(crate) fn io_uring_setup(entries: u32, params: &mut IoUringParams) -> Result<OwnedFd, Errno> {
    // Safety: `params` is a properly laid out parameter block; the kernel
    // writes back into it and returns a fresh descriptor we take ownership
    // of.
    let fd = unsafe {
        libc::syscall(
            libc::SYS_io_uring_setup,
            entries,
            ptr::from_mut(params),
        )
    };
    if fd < 0 {
        return Err(Errno::last_os_error());
    }
    // Safety: a non-negative return is a descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

pub(crate) fn io_uring_enter(
    fd: BorrowedFd<'_>,
    to_submit: u32,
    min_complete: u32,
    flags: EnterFlags,
) -> Result<u32, Errno> {
    use std::os::fd::AsRawFd;

    // Safety: plain syscall with no signal mask; all arguments are values.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_io_uring_enter,
            fd.as_raw_fd(),
            to_submit,
            min_complete,
            flags.bits(),
            ptr::null::<libc::sigset_t>(),
            0_usize,
        )
    };
    if ret < 0 {
        return Err(Errno::last_os_error());
    }
    Ok(ret as u32)
}

pub(crate) fn io_uring_register(
    fd: BorrowedFd<'_>,
    opcode: u32,
    arg: *const c_void,
    nr_args: u32,
) -> Result<(), Errno> {
    use std::os::fd::AsRawFd;

    // Safety: `arg` either is null or points at `nr_args` valid records for
    // the given opcode; callers uphold that.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_io_uring_register,
            fd.as_raw_fd(),
            opcode,
            arg,
            nr_args,
        )
    };
    if ret < 0 {
        return Err(Errno::last_os_error());
    }
    Ok(())
}

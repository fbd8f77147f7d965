// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use std::io;

/// A raw OS error number.
///
/// The io_uring wrapper reports every syscall failure as the errno the kernel
/// returned, without retrying or translating. `EAGAIN` from a non-blocking
/// completion peek is an expected outcome and can be tested for with
/// [`Errno::is_again`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Errno(i32);

impl Errno {
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The errno left behind by the most recent failed syscall on this thread.
    #[must_use]
    pub fn last_os_error() -> Self {
        Self(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns true for `EAGAIN`, the "no completion available" result of a
    /// non-blocking completion peek.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub const fn is_again(self) -> bool {
        self.0 == libc::EAGAIN
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        io::Error::from_raw_os_error(self.0).fmt(f)
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.raw())
    }
}

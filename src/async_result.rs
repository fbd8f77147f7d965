// Copyright 2025 the riptide authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::mem;

/// The tri-state value produced by each invocation of a task's continuation.
///
/// Unlike [`Result`], an `AsyncResult` has a third state: [`Pending`]
/// signals that the task could not complete during this invocation and must
/// be polled again later. The default value is `Pending`, and every `take_*`
/// operation leaves `Pending` behind, so a freshly constructed or consumed
/// result is always in a well-defined state.
///
/// [`Pending`]: AsyncResult::Pending
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AsyncResult<T, E> {
    /// The task has not produced a result yet.
    #[default]
    Pending,
    /// The task completed successfully.
    Ok(T),
    /// The task failed.
    Error(E),
}

impl<T, E> AsyncResult<T, E> {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns true if the result is no longer pending.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !self.is_pending()
    }

    /// Borrows the success value.
    ///
    /// # Panics
    ///
    /// Panics if the result is not `Ok`.
    #[must_use]
    pub fn value(&self) -> &T {
        match self {
            Self::Ok(value) => value,
            _ => panic!("called `AsyncResult::value` on a non-ok result"),
        }
    }

    /// Borrows the error value.
    ///
    /// # Panics
    ///
    /// Panics if the result is not `Error`.
    #[must_use]
    pub fn error(&self) -> &E {
        match self {
            Self::Error(error) => error,
            _ => panic!("called `AsyncResult::error` on a non-error result"),
        }
    }

    /// Takes the success value, leaving `Pending` behind.
    ///
    /// # Panics
    ///
    /// Panics if the result is not `Ok`.
    pub fn take_value(&mut self) -> T {
        match self.take() {
            Self::Ok(value) => value,
            _ => panic!("called `AsyncResult::take_value` on a non-ok result"),
        }
    }

    /// Takes the error value, leaving `Pending` behind.
    ///
    /// # Panics
    ///
    /// Panics if the result is not `Error`.
    pub fn take_error(&mut self) -> E {
        match self.take() {
            Self::Error(error) => error,
            _ => panic!("called `AsyncResult::take_error` on a non-error result"),
        }
    }

    /// Takes the whole result, leaving `Pending` behind.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Resets the result to `Pending`.
    pub fn reset(&mut self) {
        *self = Self::Pending;
    }

    /// Converts into a [`Result`], treating `Pending` as absence.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Self::Pending => None,
            Self::Ok(value) => Some(Ok(value)),
            Self::Error(error) => Some(Err(error)),
        }
    }
}

impl<T, E> From<Result<T, E>> for AsyncResult<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pending() {
        let result = AsyncResult::<u32, ()>::default();
        assert!(result.is_pending());
        assert!(!result.is_ready());
    }

    #[test]
    fn ok_state() {
        let mut result = AsyncResult::<u32, ()>::Ok(42);
        assert!(result.is_ok());
        assert!(!result.is_error());
        assert!(result.is_ready());
        assert_eq!(*result.value(), 42);
        assert_eq!(result.take_value(), 42);
        assert!(result.is_pending());
    }

    #[test]
    fn error_state() {
        let mut result = AsyncResult::<(), &str>::Error("boom");
        assert!(result.is_error());
        assert_eq!(*result.error(), "boom");
        assert_eq!(result.take_error(), "boom");
        assert!(result.is_pending());
    }

    #[test]
    fn take_leaves_pending() {
        let mut result = AsyncResult::<u32, ()>::Ok(7);
        let taken = result.take();
        assert_eq!(taken, AsyncResult::Ok(7));
        assert!(result.is_pending());
    }

    #[test]
    fn reset() {
        let mut result = AsyncResult::<u32, ()>::Ok(7);
        result.reset();
        assert!(result.is_pending());
    }

    #[test]
    fn from_result() {
        assert_eq!(AsyncResult::<u32, ()>::from(Ok(1)), AsyncResult::Ok(1));
        assert_eq!(AsyncResult::<(), u32>::from(Err(2)), AsyncResult::Error(2));
        assert_eq!(AsyncResult::<u32, ()>::Ok(1).into_result(), Some(Ok(1)));
        assert_eq!(AsyncResult::<u32, ()>::Pending.into_result(), None);
    }

    #[test]
    #[should_panic(expected = "non-ok")]
    fn value_on_pending_panics() {
        let result = AsyncResult::<u32, ()>::Pending;
        let _ = result.value();
    }
}

//! Outcome vocabulary shared by every boundary operation of the runtime.
//!
//! Operations never panic on caller mistakes and never unwind through the core. They return an
//! [`Outcome`], which is a plain `Result` whose success side is a [`Status`] (or a value) and
//! whose failure side is an [`Error`] kind.
//!
//! Routine results such as [`Status::Noop`], [`Status::Reused`] and [`Error::Missing`] are
//! expected to be checked and discarded by callers; they never indicate a broken invariant.

use thiserror::Error;

/// A successful outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation completed and changed state.
    Success,
    /// Nothing had to be done (e.g. setting a flag that was already set, iterating an empty chain).
    Noop,
    /// An existing resource was reused instead of being created (e.g. a recycled chunk slot).
    Reused,
    /// The operation was queued and will be applied at the next deferred flush.
    Deferred,
}

impl Status {
    /// Combine two statuses. A no-op yields to the other side, otherwise the first one wins.
    #[inline]
    pub fn combine(self, other: Status) -> Status {
        match self {
            Status::Noop => other,
            _ => self,
        }
    }

    /// Build a status from a "did anything change" flag.
    #[inline]
    pub fn from_changed(changed: bool) -> Status {
        if changed { Status::Success } else { Status::Noop }
    }

    /// Is this a no-op status?
    #[inline]
    pub fn is_noop(&self) -> bool {
        matches!(self, Status::Noop)
    }
}

/// A failed outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// The requested trait, detail or subject is not present.
    #[error("the requested item is missing")]
    Missing,
    /// An argument had an invalid value.
    #[error("invalid argument")]
    InvalidArgument,
    /// A required argument was null or invalid (e.g. the invalid handle).
    #[error("null argument")]
    NullArgument,
    /// The operation is not allowed in the current state (e.g. a structural change of a solid chunk).
    #[error("operation is not allowed in the current state")]
    InvalidState,
    /// A capacity limit was reached (subject pool, grid size, registry ids).
    #[error("capacity limit reached")]
    OutOfLimit,
    /// An internal invariant was violated. Only produced with debug assertions enabled.
    #[error("sanity check failed")]
    SanityCheckFailed,
}

impl Error {
    /// Routine errors are part of normal control flow and never fatal.
    #[inline]
    pub fn is_routine(&self) -> bool {
        matches!(self, Error::Missing)
    }
}

/// The result type returned by runtime operations.
pub type Outcome<T = Status> = Result<T, Error>;

/// Verify an internal invariant. Compiles to nothing without debug assertions.
macro_rules! sanity_check {
    ($cond:expr) => {
        #[cfg(debug_assertions)]
        if !($cond) {
            log::error!("sanity check failed: {}", stringify!($cond));
            return Err($crate::ecs::status::Error::SanityCheckFailed);
        }
    };
}

pub(crate) use sanity_check;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_prefers_first_non_noop() {
        assert_eq!(Status::Noop.combine(Status::Success), Status::Success);
        assert_eq!(Status::Success.combine(Status::Noop), Status::Success);
        assert_eq!(Status::Reused.combine(Status::Success), Status::Reused);
        assert_eq!(Status::Noop.combine(Status::Noop), Status::Noop);
    }

    #[test]
    fn from_changed() {
        assert_eq!(Status::from_changed(true), Status::Success);
        assert!(Status::from_changed(false).is_noop());
    }

    #[test]
    fn routine_errors() {
        assert!(Error::Missing.is_routine());
        assert!(!Error::InvalidState.is_routine());
        assert!(!Error::OutOfLimit.is_routine());
    }
}

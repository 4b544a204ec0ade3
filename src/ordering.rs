//! Memory orderings and their mapping onto backend strength tiers.
//!
//! Every mapping in this module is a single exhaustive `match`: one ordering
//! lands on exactly one [`Strength`], and illegal pairs are rejected instead of
//! being routed to some neighbouring tier.

use crate::error::{Error, Operation, Result};

/// The ordering constraint requested for an atomic operation.
///
/// `Consume` is treated exactly like `Acquire`; no dependency ordering is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ordering {
    Relaxed,
    Consume,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

/// The four rows of the backend primitive matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    Relaxed,
    Acquire,
    Release,
    Full,
}

impl Ordering {
    /// The strength a load with this ordering executes at.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{Ordering, Strength};
    /// assert_eq!(Ordering::Consume.load_strength(), Ok(Strength::Acquire));
    /// assert!(Ordering::Release.load_strength().is_err());
    /// ```
    pub const fn load_strength(self) -> Result<Strength> {
        match self {
            Ordering::Relaxed => Ok(Strength::Relaxed),
            Ordering::Consume | Ordering::Acquire => Ok(Strength::Acquire),
            Ordering::Release => Err(Error::InvalidOrdering {
                op: Operation::Load,
                ordering: self,
            }),
            Ordering::AcqRel | Ordering::SeqCst => Ok(Strength::Full),
        }
    }

    /// The strength a store with this ordering executes at.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{Ordering, Strength};
    /// assert_eq!(Ordering::AcqRel.store_strength(), Ok(Strength::Full));
    /// assert!(Ordering::Acquire.store_strength().is_err());
    /// ```
    pub const fn store_strength(self) -> Result<Strength> {
        match self {
            Ordering::Relaxed => Ok(Strength::Relaxed),
            Ordering::Consume | Ordering::Acquire => Err(Error::InvalidOrdering {
                op: Operation::Store,
                ordering: self,
            }),
            Ordering::Release => Ok(Strength::Release),
            Ordering::AcqRel | Ordering::SeqCst => Ok(Strength::Full),
        }
    }

    /// The strength of a read-modify-write (compare-and-swap) on the success path.
    /// Every ordering is legal here.
    pub const fn rmw_strength(self) -> Strength {
        match self {
            Ordering::Relaxed => Strength::Relaxed,
            Ordering::Consume | Ordering::Acquire => Strength::Acquire,
            Ordering::Release => Strength::Release,
            Ordering::AcqRel | Ordering::SeqCst => Strength::Full,
        }
    }

    /// How strongly this ordering orders the read half of an access.
    const fn read_rank(self) -> u8 {
        match self {
            Ordering::Relaxed | Ordering::Release => 0,
            Ordering::Consume | Ordering::Acquire | Ordering::AcqRel => 1,
            Ordering::SeqCst => 2,
        }
    }

    /// The ordering the reload after a failed compare-exchange runs with.
    ///
    /// The failure ordering must be a legal load ordering and may not read
    /// more strongly than `success` does. When `success` carries acquire
    /// semantics a `Relaxed` failure is promoted to `Acquire`, so the value
    /// handed back to the caller is never less synchronized than the one the
    /// failed attempt compared against.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::Ordering;
    /// assert_eq!(
    ///     Ordering::failure_ordering(Ordering::AcqRel, Ordering::Relaxed),
    ///     Ok(Ordering::Acquire)
    /// );
    /// assert_eq!(
    ///     Ordering::failure_ordering(Ordering::Release, Ordering::Relaxed),
    ///     Ok(Ordering::Relaxed)
    /// );
    /// assert!(Ordering::failure_ordering(Ordering::Relaxed, Ordering::Acquire).is_err());
    /// ```
    pub const fn failure_ordering(success: Ordering, failure: Ordering) -> Result<Ordering> {
        if failure.load_strength().is_err() {
            return Err(Error::InvalidOrdering {
                op: Operation::FailureLoad,
                ordering: failure,
            });
        }
        if failure.read_rank() > success.read_rank() {
            return Err(Error::FailureStronger { success, failure });
        }
        match (failure, success.read_rank()) {
            (Ordering::Relaxed, 0) => Ok(Ordering::Relaxed),
            (Ordering::Relaxed, _) => Ok(Ordering::Acquire),
            (_, _) => Ok(failure),
        }
    }
}

impl From<core::sync::atomic::Ordering> for Ordering {
    fn from(order: core::sync::atomic::Ordering) -> Self {
        use core::sync::atomic::Ordering as Core;
        match order {
            Core::Relaxed => Ordering::Relaxed,
            Core::Acquire => Ordering::Acquire,
            Core::Release => Ordering::Release,
            Core::AcqRel => Ordering::AcqRel,
            Core::SeqCst => Ordering::SeqCst,
            // `core::sync::atomic::Ordering` is non_exhaustive; never map to a weaker tier.
            _ => Ordering::SeqCst,
        }
    }
}

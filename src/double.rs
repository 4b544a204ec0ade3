use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;

use crossbeam_utils::Backoff;

use crate::backend::{self, DoubleWord, Native, Primitives};
use crate::dispatch;
use crate::ordering::Ordering;
use crate::word::Word;

/// Two machine words updated together as one atomic unit.
///
/// The pair lives in a single [`DoubleWord`] slot, aligned to twice the word
/// size, and every access goes through one double-word primitive of `B`. A
/// load therefore never sees `v1` from one store and `v2` from another.
///
/// # Examples
/// ```
/// use dword_atomic::{DoubleAtomicCell, Ordering};
///
/// let cell: DoubleAtomicCell<usize, usize> = DoubleAtomicCell::new(5, 6);
/// let (mut e1, mut e2) = (5, 6);
/// assert!(cell.compare_exchange_strong(&mut e1, &mut e2, 7, 8, Ordering::SeqCst, Ordering::Relaxed));
/// assert_eq!(cell.load(Ordering::Acquire), (7, 8));
/// ```
#[repr(transparent)]
pub struct DoubleAtomicCell<T1: Word, T2: Word, B: Primitives = Native> {
    slot: UnsafeCell<DoubleWord>,
    _marker: PhantomData<fn() -> (T1, T2, B)>,
}

// The slot is only touched through the backend's double-word primitives.
unsafe impl<T1: Word, T2: Word, B: Primitives> Sync for DoubleAtomicCell<T1, T2, B> {}

fn pack<T1: Word, T2: Word>(v1: T1, v2: T2) -> DoubleWord {
    DoubleWord::new(v1.into_word(), v2.into_word())
}

fn unpack<T1: Word, T2: Word>(pair: DoubleWord) -> (T1, T2) {
    (T1::from_word(pair.lo), T2::from_word(pair.hi))
}

impl<T1: Word, T2: Word, B: Primitives> DoubleAtomicCell<T1, T2, B> {
    /// Creates a new `DoubleAtomicCell` holding the pair `(v1, v2)`.
    /// # Arguments
    /// * `v1` - The first value, stored in the low word.
    /// * `v2` - The second value, stored in the high word.
    pub fn new(v1: T1, v2: T2) -> Self {
        backend::debug_verify::<B>();
        Self {
            slot: UnsafeCell::new(pack(v1, v2)),
            _marker: PhantomData,
        }
    }

    /// Loads both values in one atomic step.
    ///
    /// # Panics
    /// Panics if `order` is [`Ordering::Release`].
    pub fn load(&self, order: Ordering) -> (T1, T2) {
        unpack(unsafe { dispatch::double_load::<B>(self.slot.get(), order) })
    }

    /// Stores both values in one atomic step.
    ///
    /// # Panics
    /// Panics if `order` is [`Ordering::Acquire`] or [`Ordering::Consume`].
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{DoubleAtomicCell, Ordering};
    /// let cell: DoubleAtomicCell<u32, bool> = DoubleAtomicCell::default();
    /// cell.store(9, true, Ordering::Release);
    /// assert_eq!(cell.load(Ordering::Acquire), (9, true));
    /// ```
    pub fn store(&self, v1: T1, v2: T2, order: Ordering) {
        unsafe { dispatch::double_store::<B>(self.slot.get(), pack(v1, v2), order) }
    }

    /// Replaces the pair with `(n1, n2)` if it currently equals `(*e1, *e2)`.
    ///
    /// Both words are compared and replaced as a unit. On failure the cell is
    /// left alone and `(*e1, *e2)` is overwritten with a single-step reload of
    /// the pair made with the effective `failure` ordering; the reload is not
    /// guaranteed to be the exact pair the failed comparison saw. Failure
    /// orderings follow the rules of [`AtomicCell::compare_exchange_strong`].
    ///
    /// [`AtomicCell::compare_exchange_strong`]: crate::AtomicCell::compare_exchange_strong
    ///
    /// # Panics
    /// Panics if `failure` is [`Ordering::Release`] or reads more strongly
    /// than `success`.
    pub fn compare_exchange_strong(
        &self,
        e1: &mut T1,
        e2: &mut T2,
        n1: T1,
        n2: T2,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        let reload = dispatch::failure_reload(success, failure);
        let ptr = self.slot.get();
        unsafe {
            let old = pack(*e1, *e2);
            if dispatch::double_compare_and_swap::<B>(ptr, old, pack(n1, n2), success) {
                return true;
            }
            (*e1, *e2) = unpack(dispatch::double_load::<B>(ptr, reload));
        }
        false
    }

    /// [`compare_exchange_strong`](Self::compare_exchange_strong) with the
    /// expected and desired pairs passed as tuples.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{DoubleAtomicCell, Ordering};
    /// let cell: DoubleAtomicCell<i32, i32> = DoubleAtomicCell::new(1, -1);
    /// let mut expected = (0, 0);
    /// assert!(!cell.compare_exchange_pair(&mut expected, (2, -2), Ordering::AcqRel, Ordering::Acquire));
    /// assert_eq!(expected, (1, -1));
    /// assert!(cell.compare_exchange_pair(&mut expected, (2, -2), Ordering::AcqRel, Ordering::Acquire));
    /// ```
    pub fn compare_exchange_pair(
        &self,
        expected: &mut (T1, T2),
        desired: (T1, T2),
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        let (e1, e2) = expected;
        self.compare_exchange_strong(e1, e2, desired.0, desired.1, success, failure)
    }

    /// Stores `(n1, n2)` and returns the pair it replaced.
    ///
    /// Built from the strong compare-exchange, retried until it lands. The
    /// returned pair is exactly the one the successful exchange overwrote.
    pub fn exchange(&self, n1: T1, n2: T2, order: Ordering) -> (T1, T2) {
        let (mut e1, mut e2) = self.load(Ordering::Relaxed);
        let backoff = Backoff::new();
        let mut retries = 0u32;
        while !self.compare_exchange_strong(&mut e1, &mut e2, n1, n2, order, Ordering::Relaxed) {
            retries += 1;
            backoff.spin();
        }
        if retries > 0 {
            log::trace!("double-word exchange landed after {} retries", retries);
        }
        (e1, e2)
    }

    /// Whether `B` performs double-word operations without a software lock.
    pub fn is_lock_free() -> bool {
        B::double_is_lock_free()
    }

    /// Consumes the cell and returns the pair.
    pub fn into_inner(self) -> (T1, T2) {
        unpack(self.slot.into_inner())
    }

    pub fn as_ptr(&self) -> *mut DoubleWord {
        self.slot.get()
    }
}

impl<T1: Word, T2: Word, B: Primitives> Default for DoubleAtomicCell<T1, T2, B> {
    fn default() -> Self {
        Self::new(T1::from_word(0), T2::from_word(0))
    }
}

impl<T1: Word, T2: Word, B: Primitives> From<(T1, T2)> for DoubleAtomicCell<T1, T2, B> {
    fn from((v1, v2): (T1, T2)) -> Self {
        Self::new(v1, v2)
    }
}

impl<T1, T2, B> fmt::Debug for DoubleAtomicCell<T1, T2, B>
where
    T1: Word + fmt::Debug,
    T2: Word + fmt::Debug,
    B: Primitives,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleAtomicCell")
            .field("value", &self.load(Ordering::Relaxed))
            .field("backend", &B::NAME)
            .finish()
    }
}

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;

use crate::backend::{self, Native, Primitives};
use crate::dispatch;
use crate::ordering::Ordering;
use crate::word::Word;

/// A single machine word updated atomically with an explicit ordering.
///
/// The cell occupies exactly one naturally aligned `usize` holding the word
/// image of a `T`. Atomicity is a property of that address: moving the cell is
/// fine, since the borrow checker already rules out a move while another
/// thread holds a reference to it.
#[repr(transparent)]
pub struct AtomicCell<T: Word, B: Primitives = Native> {
    slot: UnsafeCell<usize>,
    _marker: PhantomData<fn() -> (T, B)>,
}

// The slot is only touched through the backend's atomic primitives.
unsafe impl<T: Word, B: Primitives> Sync for AtomicCell<T, B> {}

impl<T: Word, B: Primitives> AtomicCell<T, B> {
    /// Creates a new `AtomicCell` holding `value`.
    /// # Arguments
    /// * `value` - The initial value.
    /// # Examples
    /// ```
    /// use dword_atomic::{AtomicCell, Ordering};
    /// let cell: AtomicCell<i32> = AtomicCell::new(-7);
    /// assert_eq!(cell.load(Ordering::Relaxed), -7);
    /// ```
    pub fn new(value: T) -> Self {
        backend::debug_verify::<B>();
        Self {
            slot: UnsafeCell::new(value.into_word()),
            _marker: PhantomData,
        }
    }

    /// Loads the value.
    ///
    /// # Panics
    /// Panics if `order` is [`Ordering::Release`]; a load has no release half.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{AtomicCell, Ordering};
    /// let cell: AtomicCell<usize> = AtomicCell::new(42);
    /// assert_eq!(cell.load(Ordering::Acquire), 42);
    /// ```
    pub fn load(&self, order: Ordering) -> T {
        T::from_word(unsafe { dispatch::load::<B>(self.slot.get(), order) })
    }

    /// Stores `value`.
    ///
    /// # Panics
    /// Panics if `order` is [`Ordering::Acquire`] or [`Ordering::Consume`].
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{AtomicCell, Ordering};
    /// let cell: AtomicCell<u8> = AtomicCell::default();
    /// cell.store(200, Ordering::Release);
    /// assert_eq!(cell.load(Ordering::Acquire), 200);
    /// ```
    pub fn store(&self, value: T, order: Ordering) {
        unsafe { dispatch::store::<B>(self.slot.get(), value.into_word(), order) }
    }

    /// Replaces the value with `desired` if it currently equals `*expected`.
    ///
    /// Returns `true` on success. On failure the cell is left alone, `*expected`
    /// is overwritten with a reload of the cell made with `failure` ordering,
    /// and `false` is returned. The comparison never fails spuriously.
    ///
    /// `failure` may not read more strongly than `success`, and is raised to
    /// `Acquire` when `success` has acquire semantics. Pass
    /// [`Ordering::Relaxed`] for the default.
    ///
    /// # Panics
    /// Panics if `failure` is [`Ordering::Release`] or reads more strongly
    /// than `success`.
    ///
    /// # Examples
    /// ```
    /// use dword_atomic::{AtomicCell, Ordering};
    /// let cell: AtomicCell<u32> = AtomicCell::new(0);
    ///
    /// let mut expected = 0;
    /// assert!(cell.compare_exchange_strong(&mut expected, 1, Ordering::AcqRel, Ordering::Relaxed));
    ///
    /// let mut expected = 0;
    /// assert!(!cell.compare_exchange_strong(&mut expected, 2, Ordering::AcqRel, Ordering::Relaxed));
    /// assert_eq!(expected, 1);
    /// ```
    pub fn compare_exchange_strong(
        &self,
        expected: &mut T,
        desired: T,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        let reload = dispatch::failure_reload(success, failure);
        let ptr = self.slot.get();
        unsafe {
            let old = expected.into_word();
            if dispatch::compare_and_swap::<B>(ptr, old, desired.into_word(), success) {
                return true;
            }
            *expected = T::from_word(dispatch::load::<B>(ptr, reload));
        }
        false
    }

    /// Consumes the cell and returns the value. No other thread can be
    /// accessing it, so no atomic operation is needed.
    pub fn into_inner(self) -> T {
        T::from_word(self.slot.into_inner())
    }

    /// The address of the word backing this cell.
    pub fn as_ptr(&self) -> *mut usize {
        self.slot.get()
    }

    /// Single-word operations never need a lock on any backend.
    pub const fn is_lock_free() -> bool {
        true
    }
}

impl<T: Word, B: Primitives> Default for AtomicCell<T, B> {
    /// A cell holding the all-zero word: `0`, `false` or a null pointer.
    fn default() -> Self {
        Self::new(T::from_word(0))
    }
}

impl<T: Word, B: Primitives> From<T> for AtomicCell<T, B> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Word + fmt::Debug, B: Primitives> fmt::Debug for AtomicCell<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCell")
            .field("value", &self.load(Ordering::Relaxed))
            .field("backend", &B::NAME)
            .finish()
    }
}

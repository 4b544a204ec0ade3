//! Ordering dispatch: one [`Ordering`] selects exactly one backend call.
//!
//! Each function is a single exhaustive match over the strength tier. Nothing
//! falls through from one arm into the next, and an ordering that has no
//! meaning for the operation stops the program instead of picking a weaker or
//! stronger primitive.

use crate::backend::{DoubleWord, Primitives};
use crate::error::{violated, Error, Operation};
use crate::ordering::{Ordering, Strength};

#[inline]
pub(crate) unsafe fn load<B: Primitives>(ptr: *mut usize, order: Ordering) -> usize {
    match order.load_strength() {
        Ok(Strength::Relaxed) => B::load(ptr),
        Ok(Strength::Acquire) => B::load_acquire(ptr),
        Ok(Strength::Full) => B::load_full(ptr),
        Ok(Strength::Release) | Err(_) => violated(Error::InvalidOrdering {
            op: Operation::Load,
            ordering: order,
        }),
    }
}

#[inline]
pub(crate) unsafe fn store<B: Primitives>(ptr: *mut usize, value: usize, order: Ordering) {
    match order.store_strength() {
        Ok(Strength::Relaxed) => B::store(ptr, value),
        Ok(Strength::Release) => B::store_release(ptr, value),
        Ok(Strength::Full) => B::store_full(ptr, value),
        Ok(Strength::Acquire) | Err(_) => violated(Error::InvalidOrdering {
            op: Operation::Store,
            ordering: order,
        }),
    }
}

#[inline]
pub(crate) unsafe fn compare_and_swap<B: Primitives>(
    ptr: *mut usize,
    old: usize,
    new: usize,
    success: Ordering,
) -> bool {
    match success.rmw_strength() {
        Strength::Relaxed => B::compare_and_swap(ptr, old, new),
        Strength::Acquire => B::compare_and_swap_acquire(ptr, old, new),
        Strength::Release => B::compare_and_swap_release(ptr, old, new),
        Strength::Full => B::compare_and_swap_full(ptr, old, new),
    }
}

#[inline]
pub(crate) unsafe fn double_load<B: Primitives>(
    ptr: *mut DoubleWord,
    order: Ordering,
) -> DoubleWord {
    match order.load_strength() {
        Ok(Strength::Relaxed) => B::double_load(ptr),
        Ok(Strength::Acquire) => B::double_load_acquire(ptr),
        Ok(Strength::Full) => B::double_load_full(ptr),
        Ok(Strength::Release) | Err(_) => violated(Error::InvalidOrdering {
            op: Operation::Load,
            ordering: order,
        }),
    }
}

#[inline]
pub(crate) unsafe fn double_store<B: Primitives>(
    ptr: *mut DoubleWord,
    value: DoubleWord,
    order: Ordering,
) {
    match order.store_strength() {
        Ok(Strength::Relaxed) => B::double_store(ptr, value),
        Ok(Strength::Release) => B::double_store_release(ptr, value),
        Ok(Strength::Full) => B::double_store_full(ptr, value),
        Ok(Strength::Acquire) | Err(_) => violated(Error::InvalidOrdering {
            op: Operation::Store,
            ordering: order,
        }),
    }
}

#[inline]
pub(crate) unsafe fn double_compare_and_swap<B: Primitives>(
    ptr: *mut DoubleWord,
    old: DoubleWord,
    new: DoubleWord,
    success: Ordering,
) -> bool {
    match success.rmw_strength() {
        Strength::Relaxed => B::double_compare_and_swap(ptr, old, new),
        Strength::Acquire => B::double_compare_and_swap_acquire(ptr, old, new),
        Strength::Release => B::double_compare_and_swap_release(ptr, old, new),
        Strength::Full => B::double_compare_and_swap_full(ptr, old, new),
    }
}

/// The ordering for the reload after a failed compare-exchange, or a panic if
/// the pair of orderings is illegal.
#[inline]
pub(crate) fn failure_reload(success: Ordering, failure: Ordering) -> Ordering {
    match Ordering::failure_ordering(success, failure) {
        Ok(order) => order,
        Err(err) => violated(err),
    }
}

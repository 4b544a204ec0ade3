use std::sync::atomic::{fence, AtomicUsize, Ordering};

use super::{Capabilities, DoubleWord, Op, Primitives, TAS_SET};
use crate::ordering::Strength;

/// A backend built on `core::sync::atomic`, available on every target.
///
/// The compiler already emits the right instruction sequence for each word
/// ordering, so the whole word matrix is native. The double word is native
/// where the target has a 64-bit atomic spanning two 32-bit words; elsewhere it
/// goes through the mediated fallback.
#[derive(Debug)]
pub struct Portable;

#[cfg(all(
    target_pointer_width = "32",
    target_has_atomic = "64",
    not(feature = "mediated")
))]
mod dword {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::super::DoubleWord;

    pub(super) const LOCK_FREE: bool = true;

    unsafe fn slot<'a>(ptr: *mut DoubleWord) -> &'a AtomicU64 {
        // DoubleWord is two u32 at 8-byte alignment: the same size and
        // alignment as AtomicU64.
        AtomicU64::from_ptr(ptr.cast())
    }

    fn pack(v: DoubleWord) -> u64 {
        // SAFETY: both types are 8 bytes of plain integer data.
        unsafe { std::mem::transmute::<DoubleWord, u64>(v) }
    }

    fn unpack(v: u64) -> DoubleWord {
        // SAFETY: as in `pack`; every bit pattern is a valid DoubleWord.
        unsafe { std::mem::transmute::<u64, DoubleWord>(v) }
    }

    pub(super) unsafe fn load(ptr: *mut DoubleWord, order: Ordering) -> DoubleWord {
        unpack(slot(ptr).load(order))
    }

    pub(super) unsafe fn store(ptr: *mut DoubleWord, value: DoubleWord, order: Ordering) {
        slot(ptr).store(pack(value), order)
    }

    pub(super) unsafe fn fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
        order: Ordering,
    ) -> DoubleWord {
        let failure = super::failure_of(order);
        match slot(ptr).compare_exchange(pack(old), pack(new), order, failure) {
            Ok(prev) | Err(prev) => unpack(prev),
        }
    }
}

#[cfg(not(all(
    target_pointer_width = "32",
    target_has_atomic = "64",
    not(feature = "mediated")
)))]
mod dword {
    use std::sync::atomic::Ordering;

    use super::super::{mediated, DoubleWord};

    pub(super) const LOCK_FREE: bool = false;

    // The stripe lock already hands off with acquire/release; sequential
    // consistency needs the fences on either side.
    pub(super) unsafe fn load(ptr: *mut DoubleWord, order: Ordering) -> DoubleWord {
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
        let value = mediated::load(ptr);
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
        value
    }

    pub(super) unsafe fn store(ptr: *mut DoubleWord, value: DoubleWord, order: Ordering) {
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
        mediated::store(ptr, value);
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
    }

    pub(super) unsafe fn fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
        order: Ordering,
    ) -> DoubleWord {
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
        let prev = mediated::fetch_compare_and_swap(ptr, old, new);
        if order == Ordering::SeqCst {
            std::sync::atomic::fence(Ordering::SeqCst);
        }
        prev
    }
}

unsafe fn word<'a>(ptr: *mut usize) -> &'a AtomicUsize {
    AtomicUsize::from_ptr(ptr)
}

/// The strongest failure ordering `compare_exchange` accepts for `success`.
fn failure_of(success: Ordering) -> Ordering {
    match success {
        Ordering::Acquire | Ordering::AcqRel => Ordering::Acquire,
        Ordering::SeqCst => Ordering::SeqCst,
        _ => Ordering::Relaxed,
    }
}

unsafe fn fetch_cas(ptr: *mut usize, old: usize, new: usize, order: Ordering) -> usize {
    match word(ptr).compare_exchange(old, new, order, failure_of(order)) {
        Ok(prev) | Err(prev) => prev,
    }
}

unsafe impl Primitives for Portable {
    const NAME: &'static str = "portable";

    fn capabilities() -> Capabilities {
        let words = Capabilities::EMPTY
            .with_all(Op::Load)
            .with_all(Op::Store)
            .with_all(Op::FetchCompareAndSwap)
            .with_all(Op::FetchAndAdd)
            .with_all(Op::TestAndSet)
            .with_all(Op::Fence);
        if dword::LOCK_FREE {
            words
                .with_all(Op::DoubleLoad)
                .with_all(Op::DoubleStore)
                .with_all(Op::DoubleFetchCompareAndSwap)
        } else {
            words
                .with(Op::DoubleLoad, Strength::Relaxed)
                .with(Op::DoubleLoad, Strength::Full)
                .with(Op::DoubleStore, Strength::Relaxed)
                .with(Op::DoubleStore, Strength::Full)
                .with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed)
                .with(Op::DoubleFetchCompareAndSwap, Strength::Full)
        }
    }

    fn double_is_lock_free() -> bool {
        dword::LOCK_FREE
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        word(ptr).load(Ordering::Relaxed)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        word(ptr).store(value, Ordering::Relaxed)
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        fetch_cas(ptr, old, new, Ordering::Relaxed)
    }

    unsafe fn nop_full() {
        fence(Ordering::SeqCst)
    }

    unsafe fn nop_read() {
        fence(Ordering::Acquire)
    }

    unsafe fn nop_write() {
        fence(Ordering::Release)
    }

    unsafe fn load_acquire(ptr: *mut usize) -> usize {
        word(ptr).load(Ordering::Acquire)
    }

    unsafe fn load_full(ptr: *mut usize) -> usize {
        word(ptr).load(Ordering::SeqCst)
    }

    unsafe fn store_release(ptr: *mut usize, value: usize) {
        word(ptr).store(value, Ordering::Release)
    }

    unsafe fn store_full(ptr: *mut usize, value: usize) {
        word(ptr).store(value, Ordering::SeqCst)
    }

    unsafe fn fetch_compare_and_swap_acquire(ptr: *mut usize, old: usize, new: usize) -> usize {
        fetch_cas(ptr, old, new, Ordering::Acquire)
    }

    unsafe fn fetch_compare_and_swap_release(ptr: *mut usize, old: usize, new: usize) -> usize {
        fetch_cas(ptr, old, new, Ordering::Release)
    }

    unsafe fn fetch_compare_and_swap_full(ptr: *mut usize, old: usize, new: usize) -> usize {
        fetch_cas(ptr, old, new, Ordering::SeqCst)
    }

    unsafe fn fetch_and_add(ptr: *mut usize, incr: usize) -> usize {
        word(ptr).fetch_add(incr, Ordering::Relaxed)
    }

    unsafe fn fetch_and_add_acquire(ptr: *mut usize, incr: usize) -> usize {
        word(ptr).fetch_add(incr, Ordering::Acquire)
    }

    unsafe fn fetch_and_add_release(ptr: *mut usize, incr: usize) -> usize {
        word(ptr).fetch_add(incr, Ordering::Release)
    }

    unsafe fn fetch_and_add_full(ptr: *mut usize, incr: usize) -> usize {
        word(ptr).fetch_add(incr, Ordering::SeqCst)
    }

    unsafe fn test_and_set(ptr: *mut usize) -> bool {
        word(ptr).swap(TAS_SET, Ordering::Relaxed) != 0
    }

    unsafe fn test_and_set_acquire(ptr: *mut usize) -> bool {
        word(ptr).swap(TAS_SET, Ordering::Acquire) != 0
    }

    unsafe fn test_and_set_release(ptr: *mut usize) -> bool {
        word(ptr).swap(TAS_SET, Ordering::Release) != 0
    }

    unsafe fn test_and_set_full(ptr: *mut usize) -> bool {
        word(ptr).swap(TAS_SET, Ordering::SeqCst) != 0
    }

    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        dword::fetch_compare_and_swap(ptr, old, new, Ordering::Relaxed)
    }

    unsafe fn double_fetch_compare_and_swap_full(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        dword::fetch_compare_and_swap(ptr, old, new, Ordering::SeqCst)
    }

    unsafe fn double_load(ptr: *mut DoubleWord) -> DoubleWord {
        dword::load(ptr, Ordering::Relaxed)
    }

    unsafe fn double_load_full(ptr: *mut DoubleWord) -> DoubleWord {
        dword::load(ptr, Ordering::SeqCst)
    }

    unsafe fn double_store(ptr: *mut DoubleWord, value: DoubleWord) {
        dword::store(ptr, value, Ordering::Relaxed)
    }

    unsafe fn double_store_full(ptr: *mut DoubleWord, value: DoubleWord) {
        dword::store(ptr, value, Ordering::SeqCst)
    }

    #[cfg(all(
        target_pointer_width = "32",
        target_has_atomic = "64",
        not(feature = "mediated")
    ))]
    unsafe fn double_load_acquire(ptr: *mut DoubleWord) -> DoubleWord {
        dword::load(ptr, Ordering::Acquire)
    }

    #[cfg(all(
        target_pointer_width = "32",
        target_has_atomic = "64",
        not(feature = "mediated")
    ))]
    unsafe fn double_store_release(ptr: *mut DoubleWord, value: DoubleWord) {
        dword::store(ptr, value, Ordering::Release)
    }

    #[cfg(all(
        target_pointer_width = "32",
        target_has_atomic = "64",
        not(feature = "mediated")
    ))]
    unsafe fn double_fetch_compare_and_swap_acquire(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        dword::fetch_compare_and_swap(ptr, old, new, Ordering::Acquire)
    }

    #[cfg(all(
        target_pointer_width = "32",
        target_has_atomic = "64",
        not(feature = "mediated")
    ))]
    unsafe fn double_fetch_compare_and_swap_release(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        dword::fetch_compare_and_swap(ptr, old, new, Ordering::Release)
    }
}

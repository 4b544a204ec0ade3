use std::arch::asm;

use super::{Capabilities, DoubleWord, Op, Primitives, TAS_SET};
use crate::ordering::Strength;

/// The AArch64 backend, written as a load-linked/store-conditional machine.
///
/// Read-modify-writes take a reservation with `ldxr`, compute, and retry when
/// `stxr` reports that the reservation was lost. The double word does the same
/// with `ldxp`/`stxp`. Only the relaxed forms, the one-instruction
/// acquire load (`ldar`) and release store (`stlr`), and the `dmb` barriers
/// are implemented here; every full-strength operation and every
/// ordered read-modify-write is left to the generalization pass.
#[derive(Debug)]
pub struct Llsc;

#[inline(always)]
unsafe fn ldr(ptr: *mut usize) -> usize {
    let value: usize;
    asm!(
        "ldr {value}, [{ptr}]",
        ptr = in(reg) ptr,
        value = lateout(reg) value,
        options(nostack, preserves_flags),
    );
    value
}

#[inline(always)]
unsafe fn ldar(ptr: *mut usize) -> usize {
    let value: usize;
    asm!(
        "ldar {value}, [{ptr}]",
        ptr = in(reg) ptr,
        value = lateout(reg) value,
        options(nostack, preserves_flags),
    );
    value
}

#[inline(always)]
unsafe fn str_word(ptr: *mut usize, value: usize) {
    asm!(
        "str {value}, [{ptr}]",
        ptr = in(reg) ptr,
        value = in(reg) value,
        options(nostack, preserves_flags),
    );
}

#[inline(always)]
unsafe fn stlr(ptr: *mut usize, value: usize) {
    asm!(
        "stlr {value}, [{ptr}]",
        ptr = in(reg) ptr,
        value = in(reg) value,
        options(nostack, preserves_flags),
    );
}

unsafe impl Primitives for Llsc {
    const NAME: &'static str = "llsc";

    fn capabilities() -> Capabilities {
        Capabilities::EMPTY
            .with(Op::Load, Strength::Relaxed)
            .with(Op::Load, Strength::Acquire)
            .with(Op::Store, Strength::Relaxed)
            .with(Op::Store, Strength::Release)
            .with(Op::FetchCompareAndSwap, Strength::Relaxed)
            .with(Op::FetchAndAdd, Strength::Relaxed)
            .with(Op::TestAndSet, Strength::Relaxed)
            .with_all(Op::Fence)
            .with(Op::DoubleLoad, Strength::Relaxed)
            .with(Op::DoubleStore, Strength::Relaxed)
            .with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed)
    }

    fn double_is_lock_free() -> bool {
        !cfg!(feature = "mediated")
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        ldr(ptr)
    }

    unsafe fn load_acquire(ptr: *mut usize) -> usize {
        ldar(ptr)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        str_word(ptr, value)
    }

    unsafe fn store_release(ptr: *mut usize, value: usize) {
        stlr(ptr, value)
    }

    unsafe fn nop_full() {
        asm!(dmb_full!(), options(nostack, preserves_flags));
    }

    unsafe fn nop_read() {
        asm!(dmb_read!(), options(nostack, preserves_flags));
    }

    unsafe fn nop_write() {
        asm!(dmb_write!(), options(nostack, preserves_flags));
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        let prev: usize;
        asm!(
            "2:",
            "ldxr {prev}, [{ptr}]",
            "cmp {prev}, {old}",
            "b.ne 3f",
            "stxr {status:w}, {new}, [{ptr}]",
            "cbnz {status:w}, 2b",
            "b 4f",
            "3:",
            "clrex",
            "4:",
            ptr = in(reg) ptr,
            old = in(reg) old,
            new = in(reg) new,
            prev = out(reg) prev,
            status = out(reg) _,
            options(nostack),
        );
        prev
    }

    unsafe fn fetch_and_add(ptr: *mut usize, incr: usize) -> usize {
        let prev: usize;
        asm!(
            "2:",
            "ldxr {prev}, [{ptr}]",
            "add {next}, {prev}, {incr}",
            "stxr {status:w}, {next}, [{ptr}]",
            "cbnz {status:w}, 2b",
            ptr = in(reg) ptr,
            incr = in(reg) incr,
            prev = out(reg) prev,
            next = out(reg) _,
            status = out(reg) _,
            options(nostack, preserves_flags),
        );
        prev
    }

    unsafe fn test_and_set(ptr: *mut usize) -> bool {
        let prev: usize;
        asm!(
            "2:",
            "ldxr {prev}, [{ptr}]",
            "stxr {status:w}, {set}, [{ptr}]",
            "cbnz {status:w}, 2b",
            ptr = in(reg) ptr,
            set = in(reg) TAS_SET,
            prev = out(reg) prev,
            status = out(reg) _,
            options(nostack, preserves_flags),
        );
        prev != 0
    }

    #[cfg(not(feature = "mediated"))]
    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        let (lo, hi): (usize, usize);
        // A pair read by ldxp is only single-copy atomic once the matching
        // stxp succeeds, so a mismatch writes the observed pair back instead
        // of dropping the reservation.
        asm!(
            "2:",
            "ldxp {lo}, {hi}, [{ptr}]",
            "cmp {lo}, {old_lo}",
            "ccmp {hi}, {old_hi}, #0, eq",
            "b.ne 3f",
            "stxp {status:w}, {new_lo}, {new_hi}, [{ptr}]",
            "cbnz {status:w}, 2b",
            "b 4f",
            "3:",
            "stxp {status:w}, {lo}, {hi}, [{ptr}]",
            "cbnz {status:w}, 2b",
            "4:",
            ptr = in(reg) ptr,
            old_lo = in(reg) old.lo,
            old_hi = in(reg) old.hi,
            new_lo = in(reg) new.lo,
            new_hi = in(reg) new.hi,
            lo = out(reg) lo,
            hi = out(reg) hi,
            status = out(reg) _,
            options(nostack),
        );
        DoubleWord { lo, hi }
    }

    #[cfg(not(feature = "mediated"))]
    unsafe fn double_load(ptr: *mut DoubleWord) -> DoubleWord {
        let (lo, hi): (usize, usize);
        asm!(
            "2:",
            "ldxp {lo}, {hi}, [{ptr}]",
            "stxp {status:w}, {lo}, {hi}, [{ptr}]",
            "cbnz {status:w}, 2b",
            ptr = in(reg) ptr,
            lo = out(reg) lo,
            hi = out(reg) hi,
            status = out(reg) _,
            options(nostack, preserves_flags),
        );
        DoubleWord { lo, hi }
    }

    #[cfg(not(feature = "mediated"))]
    unsafe fn double_store(ptr: *mut DoubleWord, value: DoubleWord) {
        asm!(
            "2:",
            "ldxp {old_lo}, {old_hi}, [{ptr}]",
            "stxp {status:w}, {lo}, {hi}, [{ptr}]",
            "cbnz {status:w}, 2b",
            ptr = in(reg) ptr,
            lo = in(reg) value.lo,
            hi = in(reg) value.hi,
            old_lo = out(reg) _,
            old_hi = out(reg) _,
            status = out(reg) _,
            options(nostack, preserves_flags),
        );
    }

    #[cfg(feature = "mediated")]
    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        super::mediated::fetch_compare_and_swap(ptr, old, new)
    }

    #[cfg(feature = "mediated")]
    unsafe fn double_load(ptr: *mut DoubleWord) -> DoubleWord {
        super::mediated::load(ptr)
    }

    #[cfg(feature = "mediated")]
    unsafe fn double_store(ptr: *mut DoubleWord, value: DoubleWord) {
        super::mediated::store(ptr, value)
    }
}

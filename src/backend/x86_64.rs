use std::arch::asm;
use std::sync::atomic::{compiler_fence, AtomicU8, Ordering};

use super::{mediated, Capabilities, DoubleWord, Op, Primitives, TAS_SET};
use crate::ordering::Strength;

/// The x86-64 backend.
///
/// x86-64 is TSO: plain `mov` loads already have acquire semantics and plain
/// `mov` stores release semantics, and every `lock`-prefixed instruction (and
/// `xchg` with memory) is a full barrier. So the only strength that costs an
/// extra instruction is the full store, done with `xchg`. One-sided fences
/// only have to stop the compiler.
///
/// The double word uses `lock cmpxchg16b`, which the first x86-64 CPUs lack; it
/// is detected at run time and the mediated fallback used without it.
#[derive(Debug)]
pub struct X86_64;

const UNKNOWN: u8 = 0;
const PRESENT: u8 = 1;
const ABSENT: u8 = 2;

static CMPXCHG16B: AtomicU8 = AtomicU8::new(UNKNOWN);

#[inline]
fn has_cmpxchg16b() -> bool {
    if cfg!(feature = "mediated") {
        return false;
    }
    if cfg!(target_feature = "cmpxchg16b") {
        return true;
    }
    match CMPXCHG16B.load(Ordering::Relaxed) {
        PRESENT => true,
        ABSENT => false,
        _ => detect_cmpxchg16b(),
    }
}

#[cold]
fn detect_cmpxchg16b() -> bool {
    let present = std::is_x86_feature_detected!("cmpxchg16b");
    if present {
        log::debug!("cmpxchg16b detected, double-word operations are lock-free");
    } else {
        log::warn!("cmpxchg16b not available, double-word operations fall back to striped locks");
    }
    CMPXCHG16B.store(if present { PRESENT } else { ABSENT }, Ordering::Relaxed);
    present
}

#[inline(always)]
unsafe fn mov_load(ptr: *mut usize) -> usize {
    let value: usize;
    asm!(
        "mov {value}, qword ptr [{ptr}]",
        ptr = in(reg) ptr,
        value = lateout(reg) value,
        options(nostack, preserves_flags),
    );
    value
}

#[inline(always)]
unsafe fn mov_store(ptr: *mut usize, value: usize) {
    asm!(
        "mov qword ptr [{ptr}], {value}",
        ptr = in(reg) ptr,
        value = in(reg) value,
        options(nostack, preserves_flags),
    );
}

#[inline(always)]
unsafe fn xchg(ptr: *mut usize, value: usize) -> usize {
    let prev: usize;
    asm!(
        "xchg qword ptr [{ptr}], {value}",
        ptr = in(reg) ptr,
        value = inout(reg) value => prev,
        options(nostack, preserves_flags),
    );
    prev
}

#[inline(always)]
unsafe fn lock_cmpxchg(ptr: *mut usize, old: usize, new: usize) -> usize {
    let prev: usize;
    asm!(
        "lock cmpxchg qword ptr [{ptr}], {new}",
        ptr = in(reg) ptr,
        new = in(reg) new,
        inout("rax") old => prev,
        options(nostack),
    );
    prev
}

#[inline(always)]
unsafe fn lock_xadd(ptr: *mut usize, incr: usize) -> usize {
    let prev: usize;
    asm!(
        "lock xadd qword ptr [{ptr}], {incr}",
        ptr = in(reg) ptr,
        incr = inout(reg) incr => prev,
        options(nostack),
    );
    prev
}

#[inline(always)]
unsafe fn mfence() {
    asm!("mfence", options(nostack, preserves_flags));
}

#[target_feature(enable = "cmpxchg16b")]
unsafe fn lock_cmpxchg16b(ptr: *mut DoubleWord, old: DoubleWord, new: DoubleWord) -> DoubleWord {
    let (lo, hi): (usize, usize);
    // rbx is reserved by LLVM and cannot be an operand; swap the low word of
    // `new` into it around the instruction.
    asm!(
        "xchg {rbx_tmp}, rbx",
        "lock cmpxchg16b xmmword ptr [{ptr}]",
        "mov rbx, {rbx_tmp}",
        ptr = in(reg) ptr,
        rbx_tmp = inout(reg) new.lo => _,
        in("rcx") new.hi,
        inout("rax") old.lo => lo,
        inout("rdx") old.hi => hi,
        options(nostack),
    );
    DoubleWord { lo, hi }
}

unsafe fn mediated_full(ptr: *mut DoubleWord, old: DoubleWord, new: DoubleWord) -> DoubleWord {
    mfence();
    let prev = mediated::fetch_compare_and_swap(ptr, old, new);
    mfence();
    prev
}

unsafe impl Primitives for X86_64 {
    const NAME: &'static str = "x86_64";

    fn capabilities() -> Capabilities {
        Capabilities::EMPTY
            .with_all(Op::Load)
            .with_all(Op::Store)
            .with_all(Op::FetchCompareAndSwap)
            .with_all(Op::FetchAndAdd)
            .with_all(Op::TestAndSet)
            .with_all(Op::Fence)
            .with(Op::DoubleLoad, Strength::Relaxed)
            .with(Op::DoubleLoad, Strength::Full)
            .with(Op::DoubleStore, Strength::Relaxed)
            .with(Op::DoubleStore, Strength::Full)
            .with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed)
            .with(Op::DoubleFetchCompareAndSwap, Strength::Full)
    }

    fn double_is_lock_free() -> bool {
        has_cmpxchg16b()
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        mov_load(ptr)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        mov_store(ptr, value)
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        lock_cmpxchg(ptr, old, new)
    }

    unsafe fn nop_full() {
        mfence()
    }

    unsafe fn nop_read() {
        compiler_fence(Ordering::Acquire)
    }

    unsafe fn nop_write() {
        compiler_fence(Ordering::Release)
    }

    unsafe fn load_acquire(ptr: *mut usize) -> usize {
        mov_load(ptr)
    }

    unsafe fn load_full(ptr: *mut usize) -> usize {
        // Full stores are `xchg`, so a plain load is sequentially consistent.
        mov_load(ptr)
    }

    unsafe fn store_release(ptr: *mut usize, value: usize) {
        mov_store(ptr, value)
    }

    unsafe fn store_full(ptr: *mut usize, value: usize) {
        xchg(ptr, value);
    }

    unsafe fn fetch_compare_and_swap_acquire(ptr: *mut usize, old: usize, new: usize) -> usize {
        lock_cmpxchg(ptr, old, new)
    }

    unsafe fn fetch_compare_and_swap_release(ptr: *mut usize, old: usize, new: usize) -> usize {
        lock_cmpxchg(ptr, old, new)
    }

    unsafe fn fetch_compare_and_swap_full(ptr: *mut usize, old: usize, new: usize) -> usize {
        lock_cmpxchg(ptr, old, new)
    }

    unsafe fn fetch_and_add(ptr: *mut usize, incr: usize) -> usize {
        lock_xadd(ptr, incr)
    }

    unsafe fn fetch_and_add_acquire(ptr: *mut usize, incr: usize) -> usize {
        lock_xadd(ptr, incr)
    }

    unsafe fn fetch_and_add_release(ptr: *mut usize, incr: usize) -> usize {
        lock_xadd(ptr, incr)
    }

    unsafe fn fetch_and_add_full(ptr: *mut usize, incr: usize) -> usize {
        lock_xadd(ptr, incr)
    }

    unsafe fn test_and_set(ptr: *mut usize) -> bool {
        xchg(ptr, TAS_SET) != 0
    }

    unsafe fn test_and_set_acquire(ptr: *mut usize) -> bool {
        xchg(ptr, TAS_SET) != 0
    }

    unsafe fn test_and_set_release(ptr: *mut usize) -> bool {
        xchg(ptr, TAS_SET) != 0
    }

    unsafe fn test_and_set_full(ptr: *mut usize) -> bool {
        xchg(ptr, TAS_SET) != 0
    }

    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        if has_cmpxchg16b() {
            lock_cmpxchg16b(ptr, old, new)
        } else {
            mediated::fetch_compare_and_swap(ptr, old, new)
        }
    }

    unsafe fn double_fetch_compare_and_swap_full(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        if has_cmpxchg16b() {
            lock_cmpxchg16b(ptr, old, new)
        } else {
            mediated_full(ptr, old, new)
        }
    }

    unsafe fn double_load(ptr: *mut DoubleWord) -> DoubleWord {
        if has_cmpxchg16b() {
            let guess = DoubleWord::default();
            lock_cmpxchg16b(ptr, guess, guess)
        } else {
            mediated::load(ptr)
        }
    }

    unsafe fn double_load_full(ptr: *mut DoubleWord) -> DoubleWord {
        if has_cmpxchg16b() {
            let guess = DoubleWord::default();
            lock_cmpxchg16b(ptr, guess, guess)
        } else {
            mfence();
            let value = mediated::load(ptr);
            mfence();
            value
        }
    }

    unsafe fn double_store(ptr: *mut DoubleWord, value: DoubleWord) {
        if !has_cmpxchg16b() {
            return mediated::store(ptr, value);
        }
        let mut current = DoubleWord::default();
        loop {
            let seen = lock_cmpxchg16b(ptr, current, value);
            if seen == current {
                return;
            }
            current = seen;
        }
    }

    unsafe fn double_store_full(ptr: *mut DoubleWord, value: DoubleWord) {
        if has_cmpxchg16b() {
            // Every cmpxchg16b is already a full barrier.
            Self::double_store(ptr, value)
        } else {
            mfence();
            mediated::store(ptr, value);
            mfence();
        }
    }
}

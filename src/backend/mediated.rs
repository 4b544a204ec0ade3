//! Double-word operations for targets without a double-word instruction.
//!
//! Each slot maps onto one of a fixed array of spin locks by address. Every
//! access to a mediated slot, reads included, holds that lock, so a pair is
//! never observed half-written. The lock hand-off is acquire/release; any
//! stronger ordering is added by the caller's fences.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use super::DoubleWord;

// Prime, so slots at regular strides still spread over every lock.
const STRIPES: usize = 67;

const UNLOCKED: CachePadded<AtomicBool> = CachePadded::new(AtomicBool::new(false));
static LOCKS: [CachePadded<AtomicBool>; STRIPES] = [UNLOCKED; STRIPES];

struct StripeGuard {
    lock: &'static AtomicBool,
}

impl Drop for StripeGuard {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

fn stripe_of(ptr: *mut DoubleWord) -> usize {
    (ptr as usize / std::mem::size_of::<DoubleWord>()) % STRIPES
}

fn lock(ptr: *mut DoubleWord) -> StripeGuard {
    let lock: &'static AtomicBool = &LOCKS[stripe_of(ptr)];
    let backoff = Backoff::new();
    while lock
        .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        backoff.snooze();
    }
    StripeGuard { lock }
}

pub(crate) unsafe fn load(ptr: *mut DoubleWord) -> DoubleWord {
    let _guard = lock(ptr);
    ptr::read(ptr)
}

pub(crate) unsafe fn store(ptr: *mut DoubleWord, value: DoubleWord) {
    let _guard = lock(ptr);
    ptr::write(ptr, value);
}

pub(crate) unsafe fn fetch_compare_and_swap(
    ptr: *mut DoubleWord,
    old: DoubleWord,
    new: DoubleWord,
) -> DoubleWord {
    let _guard = lock(ptr);
    let current = ptr::read(ptr);
    if current == old {
        ptr::write(ptr, new);
    }
    current
}

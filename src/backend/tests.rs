use std::cell::RefCell;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::thread;

use super::*;

/// A backend with nothing but the five required primitives.
struct Minimal;

const REQUIRED: Capabilities = Capabilities::EMPTY
    .with(Op::Load, Strength::Relaxed)
    .with(Op::Store, Strength::Relaxed)
    .with(Op::FetchCompareAndSwap, Strength::Relaxed)
    .with(Op::Fence, Strength::Full)
    .with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed);

unsafe impl Primitives for Minimal {
    const NAME: &'static str = "minimal";

    fn capabilities() -> Capabilities {
        REQUIRED
    }

    fn double_is_lock_free() -> bool {
        false
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        AtomicUsize::from_ptr(ptr).load(Ordering::Relaxed)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        AtomicUsize::from_ptr(ptr).store(value, Ordering::Relaxed)
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        let word = AtomicUsize::from_ptr(ptr);
        match word.compare_exchange(old, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(prev) | Err(prev) => prev,
        }
    }

    unsafe fn nop_full() {
        fence(Ordering::SeqCst)
    }

    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        mediated::fetch_compare_and_swap(ptr, old, new)
    }
}

unsafe fn exercise_words<B: Primitives>() {
    let mut slot = 0usize;
    let p = &mut slot as *mut usize;

    B::store_release(p, 1);
    assert_eq!(B::load_acquire(p), 1);
    B::store_full(p, 2);
    assert_eq!(B::load_full(p), 2);

    assert_eq!(B::fetch_compare_and_swap_acquire(p, 2, 3), 2);
    assert_eq!(B::fetch_compare_and_swap_release(p, 2, 4), 3);
    assert_eq!(B::fetch_compare_and_swap_full(p, 3, 4), 3);

    assert!(B::compare_and_swap(p, 4, 5));
    assert!(!B::compare_and_swap_acquire(p, 4, 6));
    assert!(B::compare_and_swap_release(p, 5, 6));
    assert!(B::compare_and_swap_full(p, 6, 7));

    assert_eq!(B::fetch_and_add(p, 1), 7);
    assert_eq!(B::fetch_and_add_acquire(p, 1), 8);
    assert_eq!(B::fetch_and_add_release(p, 1), 9);
    assert_eq!(B::fetch_and_add_full(p, usize::MAX), 10);
    assert_eq!(B::load(p), 9);

    B::store(p, 0);
    assert!(!B::test_and_set(p));
    assert!(B::test_and_set_acquire(p));
    B::store(p, 0);
    assert!(!B::test_and_set_release(p));
    assert!(B::test_and_set_full(p));
    assert_eq!(B::load(p), TAS_SET);

    B::nop_read();
    B::nop_write();
    B::nop_full();
}

unsafe fn exercise_double<B: Primitives>() {
    let mut slot = DoubleWord::default();
    let p = &mut slot as *mut DoubleWord;
    let w = DoubleWord::new;

    B::double_store(p, w(1, 2));
    assert_eq!(B::double_load(p), w(1, 2));
    B::double_store_release(p, w(3, 4));
    assert_eq!(B::double_load_acquire(p), w(3, 4));
    B::double_store_full(p, w(5, 6));
    assert_eq!(B::double_load_full(p), w(5, 6));

    assert_eq!(B::double_fetch_compare_and_swap(p, w(5, 6), w(7, 8)), w(5, 6));
    assert_eq!(B::double_fetch_compare_and_swap_acquire(p, w(5, 6), w(0, 0)), w(7, 8));
    assert_eq!(B::double_fetch_compare_and_swap_release(p, w(7, 8), w(9, 10)), w(7, 8));
    assert_eq!(B::double_fetch_compare_and_swap_full(p, w(9, 10), w(11, 12)), w(9, 10));

    assert!(B::double_compare_and_swap(p, w(11, 12), w(1, 1)));
    assert!(!B::double_compare_and_swap_acquire(p, w(11, 12), w(0, 0)));
    assert!(B::double_compare_and_swap_release(p, w(1, 1), w(2, 2)));
    assert!(B::double_compare_and_swap_full(p, w(2, 2), w(usize::MAX, 3)));
    assert_eq!(B::double_load(p), w(usize::MAX, 3));
}

fn exercise<B: Primitives>() {
    unsafe {
        exercise_words::<B>();
        exercise_double::<B>();
    }
}

#[test]
fn every_entry_behaves_on_every_backend() {
    exercise::<Minimal>();
    exercise::<Portable>();
    exercise::<Native>();
}

#[test]
fn every_backend_resolves() {
    for report in [check::<Portable>(), check::<Native>(), check::<Minimal>()] {
        let report = report.unwrap();
        assert_eq!(
            report.native.union(report.synthesized).len(),
            Primitive::matrix().count()
        );
    }
}

#[test]
fn every_backend_lists_the_required_natives() {
    for native in [Portable::capabilities(), Native::capabilities(), Minimal::capabilities()] {
        assert_eq!(REQUIRED.difference(native), Capabilities::EMPTY);
    }
}

#[test]
fn matrix_has_every_legal_entry_once() {
    let all: Vec<_> = Primitive::matrix().collect();
    assert_eq!(all.len(), 39);
    assert!(!all.contains(&Primitive::new(Op::Load, Strength::Release)));
    assert!(!all.contains(&Primitive::new(Op::DoubleStore, Strength::Acquire)));
    assert!(!all.contains(&Primitive::new(Op::Fence, Strength::Relaxed)));
    for (i, p) in all.iter().enumerate() {
        assert!(!all[i + 1..].contains(p));
    }
}

#[test]
fn recipes_only_use_legal_entries() {
    let mut required = Capabilities::EMPTY;
    for p in Primitive::matrix() {
        let recipe = p.recipe();
        if recipe.is_empty() {
            required.insert(p);
        }
        for q in recipe {
            assert!(q.is_legal(), "{} uses {}", p, q);
            assert_ne!(q, p);
        }
    }
    assert_eq!(required, REQUIRED);
}

#[test]
fn required_natives_generalize_to_the_full_matrix() {
    let full = resolve("minimal", REQUIRED).unwrap();
    assert_eq!(full.len(), 39);
    assert_eq!(full.difference(REQUIRED).len(), 34);
}

#[test]
fn missing_full_fence_is_unsupported() {
    let native = Capabilities::EMPTY
        .with(Op::Load, Strength::Relaxed)
        .with(Op::Store, Strength::Relaxed)
        .with(Op::FetchCompareAndSwap, Strength::Relaxed)
        .with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed);
    assert_eq!(
        resolve("no-fence", native),
        Err(Error::Unsupported {
            backend: "no-fence",
            primitive: Primitive::new(Op::Load, Strength::Acquire),
        })
    );
}

#[test]
fn one_sided_fences_rescue_a_missing_full_fence_only_partially() {
    // Read and write fences alone cannot build the full-strength rows.
    let native = REQUIRED
        .difference(Capabilities::EMPTY.with(Op::Fence, Strength::Full))
        .with(Op::Fence, Strength::Acquire)
        .with(Op::Fence, Strength::Release);
    match resolve("one-sided", native) {
        Err(Error::Unsupported { primitive, .. }) => {
            assert_eq!(primitive, Primitive::new(Op::Load, Strength::Full))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn missing_double_word_primitive_is_unsupported() {
    let native = REQUIRED.difference(
        Capabilities::EMPTY.with(Op::DoubleFetchCompareAndSwap, Strength::Relaxed),
    );
    let err = resolve("single-word", native).unwrap_err();
    assert_eq!(
        err,
        Error::Unsupported {
            backend: "single-word",
            primitive: Primitive::new(Op::DoubleLoad, Strength::Relaxed),
        }
    );
    assert_eq!(
        err.to_string(),
        "backend `single-word` cannot provide relaxed double load"
    );
}

#[test]
fn a_richer_table_stays_native() {
    let native = REQUIRED.with_all(Op::Load).with_all(Op::DoubleStore);
    let full = resolve("rich", native).unwrap();
    assert_eq!(full.difference(native).len(), 39 - native.len());
    assert_eq!(native.len(), 5 + 2 + 3);
}

#[test]
fn capabilities_debug_and_report_display() {
    let caps = Capabilities::EMPTY.with_all(Op::Fence);
    assert_eq!(caps.len(), 3);
    assert_eq!(format!("{:?}", caps), "{read fence, write fence, full fence}");

    let report = check::<Minimal>().unwrap();
    assert_eq!(
        report.to_string(),
        "minimal: 5 native, 34 synthesized, double word mediated"
    );
}

#[test]
fn synthesized_fetch_and_add_is_atomic() {
    let counter = AtomicUsize::new(0);
    let addr = counter.as_ptr() as usize;
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(move || {
                for _ in 0..1000 {
                    unsafe { Minimal::fetch_and_add_full(addr as *mut usize, 1) };
                }
            });
        }
    });
    assert_eq!(counter.load(Ordering::SeqCst), 4000);
}

thread_local! {
    static TRACE: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

fn emit(instruction: &'static str) {
    TRACE.with(|t| t.borrow_mut().push(instruction));
}

fn traced(f: impl FnOnce()) -> Vec<&'static str> {
    TRACE.with(|t| t.borrow_mut().clear());
    f();
    TRACE.with(|t| t.take())
}

/// The AArch64 barrier choices over the `Minimal` natives, logging the
/// instruction each step would issue.
struct LlscBarriers;

unsafe impl Primitives for LlscBarriers {
    const NAME: &'static str = "llsc-barriers";

    fn capabilities() -> Capabilities {
        REQUIRED.with_all(Op::Fence)
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        emit("ldr");
        Minimal::load(ptr)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        emit("str");
        Minimal::store(ptr, value)
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        emit("ldxr/stxr");
        Minimal::fetch_compare_and_swap(ptr, old, new)
    }

    unsafe fn nop_full() {
        emit(dmb_full!());
        fence(Ordering::SeqCst)
    }

    unsafe fn nop_read() {
        emit(dmb_read!());
        fence(Ordering::Acquire)
    }

    unsafe fn nop_write() {
        emit(dmb_write!());
        fence(Ordering::Release)
    }

    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        emit("ldxp/stxp");
        Minimal::double_fetch_compare_and_swap(ptr, old, new)
    }
}

/// Barriers that keep every earlier load and store ahead of later accesses.
fn orders_loads_and_stores(barrier: &str) -> bool {
    matches!(barrier, "dmb ish" | "dmb sy")
}

#[test]
fn release_writes_wait_for_earlier_loads() {
    let mut word = 0usize;
    let mut pair = DoubleWord::default();
    let (p, d) = (&mut word as *mut usize, &mut pair as *mut DoubleWord);
    let w = DoubleWord::new;

    let traces = unsafe {
        [
            traced(|| LlscBarriers::store_release(p, 1)),
            traced(|| {
                let _ = LlscBarriers::fetch_compare_and_swap_release(p, 1, 2);
            }),
            traced(|| {
                let _ = LlscBarriers::compare_and_swap_release(p, 2, 3);
            }),
            traced(|| {
                let _ = LlscBarriers::fetch_and_add_release(p, 1);
            }),
            traced(|| {
                let _ = LlscBarriers::test_and_set_release(p);
            }),
            traced(|| LlscBarriers::double_store_release(d, w(1, 2))),
            traced(|| {
                let _ = LlscBarriers::double_fetch_compare_and_swap_release(d, w(1, 2), w(3, 4));
            }),
            traced(|| {
                let _ = LlscBarriers::double_compare_and_swap_release(d, w(3, 4), w(5, 6));
            }),
        ]
    };
    for trace in &traces {
        assert!(trace.len() >= 2, "{:?}", trace);
        assert!(orders_loads_and_stores(trace[0]), "{:?}", trace);
    }
    assert_eq!(traces[1], ["dmb ish", "ldxr/stxr"]);
    assert_eq!(traces[5], ["dmb ish", "ldxp/stxp"]);
    assert_eq!(word, TAS_SET);
    assert_eq!(pair, w(5, 6));
}

#[test]
fn acquire_reads_are_followed_by_a_read_barrier() {
    let mut word = 0usize;
    let p = &mut word as *mut usize;
    let trace = traced(|| unsafe {
        LlscBarriers::fetch_compare_and_swap_acquire(p, 0, 1);
    });
    assert_eq!(trace, ["ldxr/stxr", dmb_read!()]);
    let trace = traced(|| unsafe {
        LlscBarriers::load_full(p);
    });
    assert_eq!(trace, [dmb_full!(), "ldr", dmb_read!()]);
}

/// A working backend whose table leaves out everything, even the required five.
struct Undeclared;

unsafe impl Primitives for Undeclared {
    const NAME: &'static str = "undeclared";

    fn capabilities() -> Capabilities {
        Capabilities::EMPTY
    }

    unsafe fn load(ptr: *mut usize) -> usize {
        Minimal::load(ptr)
    }

    unsafe fn store(ptr: *mut usize, value: usize) {
        Minimal::store(ptr, value)
    }

    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize {
        Minimal::fetch_compare_and_swap(ptr, old, new)
    }

    unsafe fn nop_full() {
        Minimal::nop_full()
    }

    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        Minimal::double_fetch_compare_and_swap(ptr, old, new)
    }
}

#[test]
fn cells_accept_a_complete_table() {
    let cell = crate::AtomicCell::<u32, Minimal>::new(3);
    assert_eq!(cell.load(crate::Ordering::SeqCst), 3);
    let pair = crate::DoubleAtomicCell::<u32, u32, LlscBarriers>::new(1, 2);
    assert_eq!(pair.load(crate::Ordering::SeqCst), (1, 2));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "backend `undeclared` cannot provide relaxed load")]
fn word_cell_rejects_an_incomplete_table() {
    crate::AtomicCell::<u32, Undeclared>::new(0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "backend `undeclared` cannot provide relaxed load")]
fn pair_cell_rejects_an_incomplete_table() {
    crate::DoubleAtomicCell::<u32, u32, Undeclared>::default();
}

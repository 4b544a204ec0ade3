use dword_atomic::backend::{Native, Portable, Primitives};
use dword_atomic::{AtomicCell, DoubleAtomicCell, Ordering};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const LOADS: [Ordering; 5] = [
    Ordering::Relaxed,
    Ordering::Consume,
    Ordering::Acquire,
    Ordering::AcqRel,
    Ordering::SeqCst,
];
const STORES: [Ordering; 4] = [
    Ordering::Relaxed,
    Ordering::Release,
    Ordering::AcqRel,
    Ordering::SeqCst,
];

fn round_trip<B: Primitives>() {
    let word: AtomicCell<i32, B> = AtomicCell::default();
    let pair: DoubleAtomicCell<usize, *const u8, B> = DoubleAtomicCell::default();
    let target = 0u8;
    let mut v = 1i32;
    for store in STORES {
        for load in LOADS {
            word.store(v, store);
            assert_eq!(word.load(load), v);

            pair.store(v as usize, &target, store);
            let (lo, hi) = pair.load(load);
            assert_eq!(lo, v as usize);
            assert!(std::ptr::eq(hi, &target));
            v = v.wrapping_mul(-3);
        }
    }
}

#[test]
fn store_then_load_round_trips() {
    init_logger();
    round_trip::<Native>();
    round_trip::<Portable>();
}

#[test]
fn stale_pair_is_refreshed_after_a_winning_exchange() {
    init_logger();
    let cell: DoubleAtomicCell<usize, usize> = DoubleAtomicCell::new(5, 6);

    // Thread B read (5, 6) before thread A's write.
    let stale = cell.load(Ordering::Acquire);
    assert_eq!(stale, (5, 6));

    std::thread::scope(|s| {
        s.spawn(|| {
            let (mut e1, mut e2) = (5, 6);
            assert!(cell.compare_exchange_strong(
                &mut e1,
                &mut e2,
                7,
                8,
                Ordering::AcqRel,
                Ordering::Relaxed
            ));
        });
    });

    let (mut e1, mut e2) = stale;
    assert!(!cell.compare_exchange_strong(
        &mut e1,
        &mut e2,
        7,
        8,
        Ordering::AcqRel,
        Ordering::Relaxed
    ));
    assert_eq!((e1, e2), (7, 8));
    assert_eq!(cell.load(Ordering::SeqCst), (7, 8));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn walk_over_a_pair_of_64_bit_fields() {
    init_logger();
    let cell: DoubleAtomicCell<u64, u64> = DoubleAtomicCell::default();

    cell.store(5, 6, Ordering::Release);
    assert_eq!(cell.load(Ordering::Acquire), (5, 6));

    let mut expected = (5, 6);
    assert!(cell.compare_exchange_pair(&mut expected, (7, 8), Ordering::AcqRel, Ordering::Relaxed));
    assert_eq!(expected, (5, 6));

    // The old pair is gone; a relaxed attempt fails and refreshes it.
    assert!(!cell.compare_exchange_pair(
        &mut expected,
        (u64::MAX, 0),
        Ordering::Relaxed,
        Ordering::Relaxed
    ));
    assert_eq!(expected, (7, 8));
    assert_eq!(cell.exchange(1 << 63, 1, Ordering::SeqCst), (7, 8));
    assert_eq!(cell.load(Ordering::SeqCst), (1 << 63, 1));
}

#[test]
fn mediated_feature_reports_locking() {
    if cfg!(feature = "mediated") {
        assert!(!DoubleAtomicCell::<usize, usize, Native>::is_lock_free());
        assert!(!DoubleAtomicCell::<usize, usize, Portable>::is_lock_free());
    }
    assert!(AtomicCell::<usize, Portable>::is_lock_free());
}

#[test]
#[should_panic(expected = "Release ordering is not valid for an atomic load")]
fn release_load_is_fatal() {
    let cell: DoubleAtomicCell<usize, usize, Portable> = DoubleAtomicCell::default();
    cell.load(Ordering::Release);
}

#[test]
fn standard_orderings_convert() {
    let cell: AtomicCell<u16> = AtomicCell::new(3);
    cell.store(4, std::sync::atomic::Ordering::Release.into());
    assert_eq!(cell.load(std::sync::atomic::Ordering::Acquire.into()), 4);
}

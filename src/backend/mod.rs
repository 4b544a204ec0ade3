//! The architecture primitive layer.
//!
//! A backend implements [`Primitives`]. Only five entries of the operation
//! matrix are required: the relaxed word load, store and fetch-compare-and-swap,
//! the full fence, and the relaxed double-word fetch-compare-and-swap. Every
//! other entry has a provided method that synthesizes it from those plus
//! fences; a backend overrides the ones it has a better instruction for and
//! lists them in its [`Capabilities`] table.
//!
//! [`resolve`] replays the same derivation rules over a capability table, so a
//! backend whose table cannot reach the complete matrix is rejected with
//! [`Error::Unsupported`] before any cell relies on it.

use std::fmt;

use crate::error::{violated, Error, Result};
use crate::ordering::Strength;

// AArch64 barriers. A release fence has to hold back earlier loads as well as
// earlier stores, which `dmb ishst` does not do; only `dmb ish` orders both.
#[cfg_attr(not(target_arch = "aarch64"), allow(unused_macros))]
macro_rules! dmb_full {
    () => {
        "dmb ish"
    };
}
#[cfg_attr(not(target_arch = "aarch64"), allow(unused_macros))]
macro_rules! dmb_read {
    () => {
        "dmb ishld"
    };
}
#[cfg_attr(not(target_arch = "aarch64"), allow(unused_macros))]
macro_rules! dmb_write {
    () => {
        "dmb ish"
    };
}

pub(crate) mod mediated;
mod portable;
#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "aarch64")]
mod llsc;

pub use portable::Portable;
#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64;
#[cfg(target_arch = "aarch64")]
pub use llsc::Llsc;

/// The best backend for the compilation target.
#[cfg(target_arch = "x86_64")]
pub type Native = X86_64;
/// The best backend for the compilation target.
#[cfg(target_arch = "aarch64")]
pub type Native = Llsc;
/// The best backend for the compilation target.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub type Native = Portable;

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("double-word cells need a 32-bit or 64-bit machine word");

/// Two machine words laid out so one double-word instruction can address both.
///
/// `lo` sits at the lower address. The alignment equals the size, which is
/// what `cmpxchg16b`, `ldxp`/`stxp` and 64-bit atomics on 32-bit targets
/// require of their operand.
#[repr(C)]
#[cfg_attr(target_pointer_width = "64", repr(align(16)))]
#[cfg_attr(target_pointer_width = "32", repr(align(8)))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoubleWord {
    pub lo: usize,
    pub hi: usize,
}

impl DoubleWord {
    pub const fn new(lo: usize, hi: usize) -> Self {
        Self { lo, hi }
    }
}

/// The value `test_and_set` writes.
pub const TAS_SET: usize = 1;

/// An operation column of the primitive matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Load,
    Store,
    CompareAndSwap,
    FetchCompareAndSwap,
    FetchAndAdd,
    TestAndSet,
    /// `Acquire` is the read fence, `Release` the write fence.
    Fence,
    DoubleLoad,
    DoubleStore,
    DoubleCompareAndSwap,
    DoubleFetchCompareAndSwap,
}

impl Op {
    const ALL: [Op; 11] = [
        Op::Load,
        Op::Store,
        Op::CompareAndSwap,
        Op::FetchCompareAndSwap,
        Op::FetchAndAdd,
        Op::TestAndSet,
        Op::Fence,
        Op::DoubleLoad,
        Op::DoubleStore,
        Op::DoubleCompareAndSwap,
        Op::DoubleFetchCompareAndSwap,
    ];

    fn name(self) -> &'static str {
        match self {
            Op::Load => "load",
            Op::Store => "store",
            Op::CompareAndSwap => "compare-and-swap",
            Op::FetchCompareAndSwap => "fetch-compare-and-swap",
            Op::FetchAndAdd => "fetch-and-add",
            Op::TestAndSet => "test-and-set",
            Op::Fence => "fence",
            Op::DoubleLoad => "double load",
            Op::DoubleStore => "double store",
            Op::DoubleCompareAndSwap => "double compare-and-swap",
            Op::DoubleFetchCompareAndSwap => "double fetch-compare-and-swap",
        }
    }
}

/// One entry of the matrix: an operation at a strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Primitive {
    pub op: Op,
    pub strength: Strength,
}

const STRENGTHS: [Strength; 4] = [
    Strength::Relaxed,
    Strength::Acquire,
    Strength::Release,
    Strength::Full,
];

impl Primitive {
    pub const fn new(op: Op, strength: Strength) -> Self {
        Self { op, strength }
    }

    /// Whether the pair exists in the matrix at all. Loads have no release
    /// row, stores no acquire row, and fences no relaxed row.
    pub const fn is_legal(self) -> bool {
        match (self.op, self.strength) {
            (Op::Load | Op::DoubleLoad, Strength::Release) => false,
            (Op::Store | Op::DoubleStore, Strength::Acquire) => false,
            (Op::Fence, Strength::Relaxed) => false,
            _ => true,
        }
    }

    /// Every legal entry of the matrix.
    pub fn matrix() -> impl Iterator<Item = Primitive> {
        Op::ALL
            .into_iter()
            .flat_map(|op| STRENGTHS.into_iter().map(move |s| Primitive::new(op, s)))
            .filter(|p| p.is_legal())
    }

    const fn bit(self) -> u64 {
        let op = self.op as u64;
        let strength = match self.strength {
            Strength::Relaxed => 0,
            Strength::Acquire => 1,
            Strength::Release => 2,
            Strength::Full => 3,
        };
        1 << (op * 4 + strength)
    }

    /// The primitives this one is synthesized from by the provided methods of
    /// [`Primitives`]. Empty for the entries every backend must supply.
    pub fn recipe(self) -> Vec<Primitive> {
        use Op::*;
        use Strength::*;

        let p = Primitive::new;
        match (self.op, self.strength) {
            (Load, Relaxed) | (Store, Relaxed) | (FetchCompareAndSwap, Relaxed) => vec![],
            (Fence, Full) | (DoubleFetchCompareAndSwap, Relaxed) => vec![],

            (Fence, _) => vec![p(Fence, Full)],

            (Load, Acquire) => vec![p(Load, Relaxed), p(Fence, Acquire)],
            (Load, _) => vec![p(Fence, Full), p(Load, Acquire)],
            (Store, Release) => vec![p(Fence, Release), p(Store, Relaxed)],
            (Store, _) => vec![p(Store, Release), p(Fence, Full)],

            (CompareAndSwap, s) => vec![p(FetchCompareAndSwap, s)],
            (DoubleCompareAndSwap, s) => vec![p(DoubleFetchCompareAndSwap, s)],

            (FetchAndAdd, Relaxed) | (TestAndSet, Relaxed) => {
                vec![p(Load, Relaxed), p(FetchCompareAndSwap, Relaxed)]
            }
            (DoubleLoad, Relaxed) | (DoubleStore, Relaxed) => {
                vec![p(DoubleFetchCompareAndSwap, Relaxed)]
            }

            (DoubleLoad, Acquire) => vec![p(DoubleLoad, Relaxed), p(Fence, Acquire)],
            (DoubleLoad, _) => vec![p(Fence, Full), p(DoubleLoad, Acquire)],
            (DoubleStore, Release) => vec![p(Fence, Release), p(DoubleStore, Relaxed)],
            (DoubleStore, _) => vec![p(DoubleStore, Release), p(Fence, Full)],

            // Read-modify-writes: the relaxed form fenced on the side(s) the
            // strength constrains.
            (op, Acquire) => vec![p(op, Relaxed), p(Fence, Acquire)],
            (op, Release) => vec![p(Fence, Release), p(op, Relaxed)],
            (op, _) => vec![p(Fence, Full), p(op, Relaxed)],
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strength = match (self.op, self.strength) {
            (Op::Fence, Strength::Acquire) => return f.write_str("read fence"),
            (Op::Fence, Strength::Release) => return f.write_str("write fence"),
            (_, Strength::Relaxed) => "relaxed",
            (_, Strength::Acquire) => "acquire",
            (_, Strength::Release) => "release",
            (_, Strength::Full) => "full",
        };
        write!(f, "{} {}", strength, self.op.name())
    }
}

/// A set of matrix entries, used as a backend's table of native primitives.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u64);

impl Capabilities {
    pub const EMPTY: Capabilities = Capabilities(0);

    pub const fn with(self, op: Op, strength: Strength) -> Self {
        Capabilities(self.0 | Primitive::new(op, strength).bit())
    }

    /// Adds `op` at every strength the matrix has for it.
    pub const fn with_all(self, op: Op) -> Self {
        let mut caps = self;
        let mut i = 0;
        while i < STRENGTHS.len() {
            let p = Primitive::new(op, STRENGTHS[i]);
            if p.is_legal() {
                caps = Capabilities(caps.0 | p.bit());
            }
            i += 1;
        }
        caps
    }

    pub const fn contains(self, p: Primitive) -> bool {
        self.0 & p.bit() != 0
    }

    pub const fn union(self, other: Capabilities) -> Self {
        Capabilities(self.0 | other.0)
    }

    pub const fn difference(self, other: Capabilities) -> Self {
        Capabilities(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Primitive> {
        Primitive::matrix().filter(move |p| self.contains(*p))
    }

    pub fn len(self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn insert(&mut self, p: Primitive) {
        self.0 |= p.bit();
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for p in self.iter() {
            set.entry(&format_args!("{}", p));
        }
        set.finish()
    }
}

/// Runs the generalization pass over `native`.
///
/// Returns the complete matrix if every entry is native or can be synthesized,
/// otherwise the first entry that cannot.
pub fn resolve(backend: &'static str, native: Capabilities) -> Result<Capabilities> {
    let mut have = native;
    loop {
        let mut grew = false;
        for p in Primitive::matrix() {
            if have.contains(p) {
                continue;
            }
            let recipe = p.recipe();
            if !recipe.is_empty() && recipe.iter().all(|q| have.contains(*q)) {
                have.insert(p);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    match Primitive::matrix().find(|p| !have.contains(*p)) {
        Some(primitive) => Err(Error::Unsupported { backend, primitive }),
        None => Ok(have),
    }
}

/// What a backend brings and what the generalization pass fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub backend: &'static str,
    pub native: Capabilities,
    pub synthesized: Capabilities,
    pub double_lock_free: bool,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} native, {} synthesized, double word {}",
            self.backend,
            self.native.len(),
            self.synthesized.len(),
            if self.double_lock_free {
                "lock-free"
            } else {
                "mediated"
            }
        )
    }
}

/// Verifies that `B` can provide the complete primitive matrix.
///
/// # Examples
/// ```
/// use dword_atomic::backend::{self, Native, Primitive};
/// let report = backend::check::<Native>().unwrap();
/// assert_eq!(
///     report.native.len() + report.synthesized.len(),
///     Primitive::matrix().count()
/// );
/// ```
pub fn check<B: Primitives>() -> Result<Report> {
    let native = B::capabilities();
    let full = resolve(B::NAME, native).map_err(|err| {
        log::error!("{}", err);
        err
    })?;
    let report = Report {
        backend: B::NAME,
        native,
        synthesized: full.difference(native),
        double_lock_free: B::double_is_lock_free(),
    };
    log::debug!("{}", report);
    log::trace!("{} synthesized: {:?}", B::NAME, report.synthesized);
    Ok(report)
}

/// Stops the program if `B`'s capability table cannot reach the full matrix.
/// Debug builds run this whenever a cell is created.
#[inline]
pub(crate) fn debug_verify<B: Primitives>() {
    if cfg!(debug_assertions) {
        if let Err(err) = resolve(B::NAME, B::capabilities()) {
            violated(err)
        }
    }
}

/// The primitive operation matrix of one architecture.
///
/// Every method operates on a raw slot: `ptr` must be non-null, naturally
/// aligned (a [`DoubleWord`] slot has the alignment of its type), valid for
/// reads and writes, and only accessed concurrently through this backend.
///
/// # Safety
///
/// The five required methods mean every entry exists at compile time; the
/// capability table only says which ones are native. It must still list the
/// required five, and cells check that in debug builds.
///
/// Implementors guarantee that each method is atomic with respect to every
/// other method of the same backend on the same slot, and that the double-word
/// methods never let a load observe a torn pair. The relaxed double-word
/// fetch-compare-and-swap in particular must operate on both words as a unit.
pub unsafe trait Primitives: 'static {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// The entries this backend implements directly.
    fn capabilities() -> Capabilities;

    /// Whether the double-word methods are free of software locks.
    fn double_is_lock_free() -> bool {
        true
    }

    unsafe fn load(ptr: *mut usize) -> usize;
    unsafe fn store(ptr: *mut usize, value: usize);
    /// Replaces `*ptr` with `new` if it equals `old`; returns what was there.
    unsafe fn fetch_compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> usize;
    unsafe fn nop_full();
    unsafe fn double_fetch_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord;

    // Fences.

    /// Orders earlier loads before later loads and stores.
    unsafe fn nop_read() {
        Self::nop_full()
    }

    /// Orders earlier loads and stores before later stores. Every release
    /// entry is built on this, so a store-store barrier is not enough.
    unsafe fn nop_write() {
        Self::nop_full()
    }

    // Word loads and stores.

    unsafe fn load_acquire(ptr: *mut usize) -> usize {
        let value = Self::load(ptr);
        Self::nop_read();
        value
    }

    unsafe fn load_full(ptr: *mut usize) -> usize {
        Self::nop_full();
        Self::load_acquire(ptr)
    }

    unsafe fn store_release(ptr: *mut usize, value: usize) {
        Self::nop_write();
        Self::store(ptr, value)
    }

    unsafe fn store_full(ptr: *mut usize, value: usize) {
        Self::store_release(ptr, value);
        Self::nop_full()
    }

    // Word fetch-compare-and-swap.

    unsafe fn fetch_compare_and_swap_acquire(ptr: *mut usize, old: usize, new: usize) -> usize {
        let prev = Self::fetch_compare_and_swap(ptr, old, new);
        Self::nop_read();
        prev
    }

    unsafe fn fetch_compare_and_swap_release(ptr: *mut usize, old: usize, new: usize) -> usize {
        Self::nop_write();
        Self::fetch_compare_and_swap(ptr, old, new)
    }

    unsafe fn fetch_compare_and_swap_full(ptr: *mut usize, old: usize, new: usize) -> usize {
        Self::nop_full();
        let prev = Self::fetch_compare_and_swap(ptr, old, new);
        Self::nop_full();
        prev
    }

    // Word compare-and-swap.

    unsafe fn compare_and_swap(ptr: *mut usize, old: usize, new: usize) -> bool {
        Self::fetch_compare_and_swap(ptr, old, new) == old
    }

    unsafe fn compare_and_swap_acquire(ptr: *mut usize, old: usize, new: usize) -> bool {
        Self::fetch_compare_and_swap_acquire(ptr, old, new) == old
    }

    unsafe fn compare_and_swap_release(ptr: *mut usize, old: usize, new: usize) -> bool {
        Self::fetch_compare_and_swap_release(ptr, old, new) == old
    }

    unsafe fn compare_and_swap_full(ptr: *mut usize, old: usize, new: usize) -> bool {
        Self::fetch_compare_and_swap_full(ptr, old, new) == old
    }

    // Fetch-and-add, wrapping on overflow.

    unsafe fn fetch_and_add(ptr: *mut usize, incr: usize) -> usize {
        let mut current = Self::load(ptr);
        loop {
            let seen = Self::fetch_compare_and_swap(ptr, current, current.wrapping_add(incr));
            if seen == current {
                return current;
            }
            current = seen;
        }
    }

    unsafe fn fetch_and_add_acquire(ptr: *mut usize, incr: usize) -> usize {
        let prev = Self::fetch_and_add(ptr, incr);
        Self::nop_read();
        prev
    }

    unsafe fn fetch_and_add_release(ptr: *mut usize, incr: usize) -> usize {
        Self::nop_write();
        Self::fetch_and_add(ptr, incr)
    }

    unsafe fn fetch_and_add_full(ptr: *mut usize, incr: usize) -> usize {
        Self::nop_full();
        let prev = Self::fetch_and_add(ptr, incr);
        Self::nop_full();
        prev
    }

    // Test-and-set: writes `TAS_SET`, returns whether the slot was already non-zero.

    unsafe fn test_and_set(ptr: *mut usize) -> bool {
        let mut current = Self::load(ptr);
        loop {
            let seen = Self::fetch_compare_and_swap(ptr, current, TAS_SET);
            if seen == current {
                return current != 0;
            }
            current = seen;
        }
    }

    unsafe fn test_and_set_acquire(ptr: *mut usize) -> bool {
        let was_set = Self::test_and_set(ptr);
        Self::nop_read();
        was_set
    }

    unsafe fn test_and_set_release(ptr: *mut usize) -> bool {
        Self::nop_write();
        Self::test_and_set(ptr)
    }

    unsafe fn test_and_set_full(ptr: *mut usize) -> bool {
        Self::nop_full();
        let was_set = Self::test_and_set(ptr);
        Self::nop_full();
        was_set
    }

    // Double-word loads and stores.

    unsafe fn double_load(ptr: *mut DoubleWord) -> DoubleWord {
        // Swapping a value for itself never changes the slot, so this only
        // observes it.
        let guess = DoubleWord::default();
        Self::double_fetch_compare_and_swap(ptr, guess, guess)
    }

    unsafe fn double_load_acquire(ptr: *mut DoubleWord) -> DoubleWord {
        let value = Self::double_load(ptr);
        Self::nop_read();
        value
    }

    unsafe fn double_load_full(ptr: *mut DoubleWord) -> DoubleWord {
        Self::nop_full();
        Self::double_load_acquire(ptr)
    }

    unsafe fn double_store(ptr: *mut DoubleWord, value: DoubleWord) {
        let mut current = DoubleWord::default();
        loop {
            let seen = Self::double_fetch_compare_and_swap(ptr, current, value);
            if seen == current {
                return;
            }
            current = seen;
        }
    }

    unsafe fn double_store_release(ptr: *mut DoubleWord, value: DoubleWord) {
        Self::nop_write();
        Self::double_store(ptr, value)
    }

    unsafe fn double_store_full(ptr: *mut DoubleWord, value: DoubleWord) {
        Self::double_store_release(ptr, value);
        Self::nop_full()
    }

    // Double-word fetch-compare-and-swap.

    unsafe fn double_fetch_compare_and_swap_acquire(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        let prev = Self::double_fetch_compare_and_swap(ptr, old, new);
        Self::nop_read();
        prev
    }

    unsafe fn double_fetch_compare_and_swap_release(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        Self::nop_write();
        Self::double_fetch_compare_and_swap(ptr, old, new)
    }

    unsafe fn double_fetch_compare_and_swap_full(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> DoubleWord {
        Self::nop_full();
        let prev = Self::double_fetch_compare_and_swap(ptr, old, new);
        Self::nop_full();
        prev
    }

    // Double-word compare-and-swap.

    unsafe fn double_compare_and_swap(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> bool {
        Self::double_fetch_compare_and_swap(ptr, old, new) == old
    }

    unsafe fn double_compare_and_swap_acquire(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> bool {
        Self::double_fetch_compare_and_swap_acquire(ptr, old, new) == old
    }

    unsafe fn double_compare_and_swap_release(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> bool {
        Self::double_fetch_compare_and_swap_release(ptr, old, new) == old
    }

    unsafe fn double_compare_and_swap_full(
        ptr: *mut DoubleWord,
        old: DoubleWord,
        new: DoubleWord,
    ) -> bool {
        Self::double_fetch_compare_and_swap_full(ptr, old, new) == old
    }
}

#[cfg(test)]
mod tests;

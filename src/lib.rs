//! Single-word and double-word atomic cells with explicit memory orderings.
//!
//! [`AtomicCell`] holds one machine word (an integer, `bool` or raw pointer)
//! and [`DoubleAtomicCell`] holds two, updated as one unit so a load never
//! observes a torn pair. Every operation takes an [`Ordering`], which selects
//! exactly one entry of the backend's primitive matrix; an ordering that makes
//! no sense for the operation panics.
//!
//! The cells are generic over a [`backend::Primitives`] implementation and
//! default to [`backend::Native`], the best backend for the target.
//!
//! # Examples
//! ```
//! use dword_atomic::{DoubleAtomicCell, Ordering};
//!
//! let top: DoubleAtomicCell<*mut u8, usize> = DoubleAtomicCell::default();
//! let (ptr, tag) = top.load(Ordering::Acquire);
//! assert!(ptr.is_null());
//! top.store(ptr, tag + 1, Ordering::Release);
//! assert_eq!(top.load(Ordering::Acquire).1, 1);
//! ```

pub mod backend;
mod cell;
mod dispatch;
mod double;
mod error;
mod ordering;
mod word;

pub use cell::AtomicCell;
pub use double::DoubleAtomicCell;
pub use error::{Error, Operation, Result};
pub use ordering::{Ordering, Strength};
pub use word::Word;

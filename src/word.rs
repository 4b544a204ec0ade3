//! Conversion of cell values to and from the machine word the backend operates on.

mod sealed {
    pub trait Sealed {}
}

/// A value that fits in one machine word: an integer no wider than `usize`, a
/// `bool`, or a raw pointer.
///
/// Every store, load result and compare-and-swap argument goes through this
/// pair of conversions, so a cell only ever holds the word image of a `T`.
/// Signed integers are sign-extended on the way in and truncated on the way
/// out, which round-trips exactly and keeps bit-equality of words identical to
/// equality of values.
pub trait Word: Copy + sealed::Sealed {
    fn into_word(self) -> usize;
    fn from_word(word: usize) -> Self;
}

macro_rules! integer_word {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl Word for $t {
                #[inline(always)]
                fn into_word(self) -> usize {
                    self as usize
                }

                #[inline(always)]
                fn from_word(word: usize) -> Self {
                    word as $t
                }
            }
        )*
    };
}

integer_word!(u8, u16, u32, usize, i8, i16, i32, isize);

#[cfg(target_pointer_width = "64")]
integer_word!(u64, i64);

impl sealed::Sealed for bool {}

impl Word for bool {
    #[inline(always)]
    fn into_word(self) -> usize {
        self as usize
    }

    #[inline(always)]
    fn from_word(word: usize) -> Self {
        word != 0
    }
}

impl<T> sealed::Sealed for *mut T {}

impl<T> Word for *mut T {
    #[inline(always)]
    fn into_word(self) -> usize {
        self as usize
    }

    #[inline(always)]
    fn from_word(word: usize) -> Self {
        word as *mut T
    }
}

impl<T> sealed::Sealed for *const T {}

impl<T> Word for *const T {
    #[inline(always)]
    fn into_word(self) -> usize {
        self as usize
    }

    #[inline(always)]
    fn from_word(word: usize) -> Self {
        word as *const T
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Word + PartialEq + std::fmt::Debug>(v: T) {
        assert_eq!(T::from_word(v.into_word()), v);
    }

    #[test]
    fn signed_values_survive_sign_extension() {
        round_trip(-1i8);
        round_trip(i16::MIN);
        round_trip(-123_456i32);
        round_trip(isize::MIN);
        assert_eq!((-1i32).into_word(), usize::MAX);
    }

    #[test]
    fn unsigned_and_bool() {
        round_trip(u8::MAX);
        round_trip(u32::MAX);
        round_trip(usize::MAX);
        round_trip(true);
        round_trip(false);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn full_width_integers() {
        round_trip(i64::MIN);
        round_trip(u64::MAX);
    }

    #[test]
    fn pointers_keep_every_bit() {
        let x = 5u64;
        let p = &x as *const u64;
        round_trip(p);
        assert_eq!(p.into_word(), p as usize);

        let high = usize::MAX & !0xf;
        assert_eq!(<*mut u8>::from_word(high) as usize, high);
        assert!(<*mut u8>::from_word(0).is_null());
    }
}

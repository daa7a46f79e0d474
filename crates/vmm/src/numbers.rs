//! Page and frame number types.
//!
//! Frames are the fixed-size blocks of emulated RAM, pages the matching blocks
//! of the virtual address space. Both are plain indices; converting them to
//! addresses needs a [`Geometry`](crate::Geometry) because the frame size is
//! chosen at run time.

use core::{
    fmt,
    ops::{Add, Sub},
};

use crate::Word;

/// Macro to define common page/frame number functionality.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_page_number_common!(
    FrameNumber,
    "A physical frame number.\n\n\
     Frame 0 always holds the root table. Any other frame holds either an\n\
     intermediate table or the data of one page."
);

impl FrameNumber {
    /// The frame holding the root table.
    pub const ROOT: Self = Self(0);

    /// Returns true if this is the root table frame.
    #[inline]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }

    /// Encodes this frame number as a table entry.
    #[inline]
    pub const fn to_entry(self) -> Word {
        self.0 as Word
    }

    /// Decodes a table entry. Returns None for the unmapped entry (0).
    #[inline]
    pub const fn from_entry(entry: Word) -> Option<Self> {
        if entry == 0 {
            None
        } else {
            Some(Self(entry as usize))
        }
    }
}

impl_page_number_common!(
    PageNumber,
    "A virtual page number.\n\n\
     The virtual address with its offset bits stripped. Page numbers are also\n\
     the keys under which evicted page content is kept in the backing store."
);

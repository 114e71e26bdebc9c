//! # Physical Addresses

use core::ops::{Add, Sub};
use kernel_info::memory::{MIN_ORDER, PAGE_SIZE};

/// A **physical** memory address.
///
/// Newtype over `u64` so that allocator-internal addresses are never mixed up
/// with kernel pointers. No alignment guarantees by itself.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[must_use]
    pub const fn from_u64(addr: u64) -> Self {
        Self(addr)
    }

    /// Address of the first byte of page `index`.
    #[must_use]
    pub const fn from_page_index(index: usize) -> Self {
        Self((index as u64) << MIN_ORDER)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Index of the page containing this address.
    #[must_use]
    pub const fn page_index(self) -> usize {
        (self.0 >> MIN_ORDER) as usize
    }

    /// Whether the address is a multiple of `1 << order`.
    #[must_use]
    pub const fn is_aligned(self, order: u32) -> bool {
        self.0 & ((1 << order) - 1) == 0
    }

    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_multiple_of(PAGE_SIZE as u64)
    }

    /// Rounds down to a multiple of `1 << order`.
    #[must_use]
    pub const fn align_down(self, order: u32) -> Self {
        Self(self.0 & !((1 << order) - 1))
    }
}

impl core::fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl core::fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:010x} (Physical @{} KiB)", self.0, self.0 / 1024)
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Self> for PhysAddr {
    type Output = u64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

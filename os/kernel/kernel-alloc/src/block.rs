//! # Buddy Block Arithmetic
//!
//! A block is identified by any address inside it together with its order.
//! Everything else (bounds, buddy, parent) is derived, so a [`Block`] is never
//! stored and never goes stale.
//!
//! ```text
//! order o+1:  [──────────────── parent ────────────────)
//! order o:    [──── left ────)[──── right (buddy) ─────)
//!             ^ first                                  ^ first + 2^(o+1)
//! ```

use crate::addr::PhysAddr;
use kernel_info::memory::{MAX_ORDER, MIN_ORDER};

/// A naturally aligned `2^order`-byte block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Block {
    first: PhysAddr,
    order: u32,
}

impl Block {
    /// The block of `order` that contains `addr`.
    #[must_use]
    pub const fn containing(addr: PhysAddr, order: u32) -> Self {
        debug_assert!(order >= MIN_ORDER && order <= MAX_ORDER);
        Self {
            first: addr.align_down(order),
            order,
        }
    }

    #[must_use]
    pub const fn order(self) -> u32 {
        self.order
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u64 {
        1 << self.order
    }

    /// Number of pages covered.
    #[must_use]
    pub const fn pages(self) -> usize {
        1 << (self.order - MIN_ORDER)
    }

    /// Lowest address in the block.
    #[must_use]
    pub const fn first(self) -> PhysAddr {
        self.first
    }

    /// Highest address in the block (inclusive).
    #[must_use]
    pub const fn last(self) -> PhysAddr {
        PhysAddr::from_u64(self.first.as_u64() + self.size() - 1)
    }

    /// Index of the first page.
    #[must_use]
    pub const fn first_page(self) -> usize {
        self.first.page_index()
    }

    /// Whether this is the lower half of its parent.
    #[must_use]
    pub const fn is_left(self) -> bool {
        (self.first.as_u64() >> self.order) & 1 == 0
    }

    /// The other half of the parent block.
    #[must_use]
    pub const fn buddy(self) -> Self {
        Self {
            first: PhysAddr::from_u64(self.first.as_u64() ^ self.size()),
            order: self.order,
        }
    }

    /// The enclosing block one order up, or `None` at `MAX_ORDER`.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        if self.order >= MAX_ORDER {
            return None;
        }
        Some(Self::containing(self.first, self.order + 1))
    }

    /// The two halves one order down, or `None` at `MIN_ORDER`.
    #[must_use]
    pub const fn split(self) -> Option<(Self, Self)> {
        if self.order <= MIN_ORDER {
            return None;
        }
        let left = Self {
            first: self.first,
            order: self.order - 1,
        };
        Some((left, left.buddy()))
    }

    #[must_use]
    pub const fn contains(self, addr: PhysAddr) -> bool {
        self.first.as_u64() <= addr.as_u64() && addr.as_u64() <= self.last().as_u64()
    }
}

/// Smallest order whose block can hold `size` bytes.
///
/// Returns `None` for zero-sized requests and for requests larger than a
/// `MAX_ORDER` block.
#[must_use]
pub const fn order_for_size(size: usize) -> Option<u32> {
    if size == 0 {
        return None;
    }
    let Some(pow) = size.checked_next_power_of_two() else {
        return None;
    };
    let order = pow.trailing_zeros();
    let order = if order < MIN_ORDER { MIN_ORDER } else { order };
    if order > MAX_ORDER { None } else { Some(order) }
}

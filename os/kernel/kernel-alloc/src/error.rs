use crate::addr::PhysAddr;
use kernel_info::errno::{EINVAL, ENOMEM};

/// Errors reported by the page allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("zero-sized allocation")]
    ZeroSize,

    #[error("allocation of {0} bytes exceeds the largest block")]
    TooLarge(usize),

    #[error("no free block large enough")]
    OutOfMemory,

    #[error("{0} is not memory managed by the page allocator")]
    NotManaged(PhysAddr),

    #[error("{0} is not the first address of an allocated block")]
    NotBlockStart(PhysAddr),
}

impl AllocError {
    /// Error number reported across the system call boundary.
    #[must_use]
    pub const fn as_errno(self) -> i32 {
        match self {
            Self::TooLarge(_) | Self::OutOfMemory => ENOMEM,
            Self::ZeroSize | Self::NotManaged(_) | Self::NotBlockStart(_) => EINVAL,
        }
    }
}

/// A broken well-formedness rule found by
/// [`PageSet::check_invariants`](crate::PageSet::check_invariants).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("page {page} has order {order} outside the buddy range")]
    BadOrder { page: usize, order: u32 },

    #[error("page {page} starts a walk step but is not aligned to its order {order}")]
    Misaligned { page: usize, order: u32 },

    #[error("block {first} of order {order} mixes page orders or states")]
    Inconsistent { first: PhysAddr, order: u32 },

    #[error("free block {first} of order {order} is not on its free list")]
    Unlinked { first: PhysAddr, order: u32 },

    #[error("page {page} is on a free list but does not start a free block")]
    StrayLink { page: usize },

    #[error("free buddies {first} and {buddy} of order {order} were left unmerged")]
    Unmerged {
        first: PhysAddr,
        buddy: PhysAddr,
        order: u32,
    },
}

//! # Filesystem Parameters

use crate::memory::PAGE_SIZE;

/// Size of a disk block in bytes. One cached block occupies one page.
pub const BLOCK_SIZE: usize = PAGE_SIZE;

/// Number of regular buffer cache slots. The superblock gets a reserved
/// slot on top of these.
pub const BUFCACHE_ENTRIES: usize = 100;

const _: () = {
    assert!(BLOCK_SIZE == PAGE_SIZE);
    assert!(BUFCACHE_ENTRIES > 0);
};

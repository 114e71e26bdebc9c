//! # In-Memory Inodes
//!
//! An [`Inode`] is a view of one 64-byte inode record inside a cached inode
//! block. It owns a [`BlockRef`], so the block stays cached while the inode is
//! in use.
//!
//! Two fields exist only in memory and are reset by [`clean_inode_block`]
//! whenever an inode block is read from disk:
//!
//! - `mlock`: a [`RwWord`] reader/writer lock (`0` unlocked, `u32::MAX`
//!   write-locked, otherwise the reader count)
//! - `mbcindex`: the cache slot holding the block
//!
//! Every field is accessed as an aligned atomic word.

use crate::cache::BlockRef;
use crate::disk::BlockDevice;
use crate::layout::{Extent, INODE_SIZE, INODES_PER_BLOCK, Inum, NDIRECT, inode_field, write_u32};
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_alloc::PageSource;
use kernel_sync::RwWord;

/// [`Cleaner`](crate::Cleaner) for inode blocks: unlocks every inode and
/// records the slot index.
#[allow(clippy::cast_possible_truncation)]
pub fn clean_inode_block(index: usize, buf: &mut [u8]) {
    for i in 0..INODES_PER_BLOCK {
        let base = i * INODE_SIZE;
        write_u32(buf, base + inode_field::MLOCK, 0);
        write_u32(buf, base + inode_field::MBCINDEX, index as u32);
    }
}

/// A referenced inode.
pub struct Inode<'c, D: BlockDevice, P: PageSource, const N: usize> {
    block: BlockRef<'c, D, P, N>,
    inum: Inum,
    offset: usize,
}

impl<'c, D: BlockDevice, P: PageSource, const N: usize> Inode<'c, D, P, N> {
    /// Views inode `inum` inside `block`, which must be the inode block
    /// holding it.
    pub(crate) fn new(block: BlockRef<'c, D, P, N>, inum: Inum) -> Self {
        let offset = inum as usize % INODES_PER_BLOCK * INODE_SIZE;
        let inode = Self {
            block,
            inum,
            offset,
        };
        debug_assert!(
            inode
                .block
                .entry()
                .contains(inode.block.as_ptr().wrapping_add(offset))
        );
        inode
    }

    #[must_use]
    pub const fn inum(&self) -> Inum {
        self.inum
    }

    /// The cached block holding this inode.
    #[must_use]
    pub const fn block(&self) -> &BlockRef<'c, D, P, N> {
        &self.block
    }

    fn word(&self, field: usize) -> &AtomicU32 {
        // SAFETY: the buffer is a page-aligned BLOCK_SIZE allocation that
        // outlives `self.block`; every field is 4-byte aligned.
        unsafe {
            AtomicU32::from_ptr(
                self.block
                    .as_ptr()
                    .add(self.offset + field)
                    .cast::<u32>(),
            )
        }
    }

    fn get(&self, field: usize) -> u32 {
        u32::from_le(self.word(field).load(Ordering::Acquire))
    }

    fn set(&self, field: usize, value: u32) {
        self.word(field).store(value.to_le(), Ordering::Release);
    }

    fn lock(&self) -> &RwWord {
        RwWord::from_atomic(self.word(inode_field::MLOCK))
    }

    /// Raw lock word.
    #[must_use]
    pub fn lock_value(&self) -> u32 {
        self.lock().raw()
    }

    /// Cache slot recorded when the block was loaded.
    #[must_use]
    pub fn mbcindex(&self) -> u32 {
        self.get(inode_field::MBCINDEX)
    }

    /// Shares the inode with other readers; blocks while a writer holds it.
    pub fn lock_read(&self) -> InodeReadGuard<'_, 'c, D, P, N> {
        self.lock().lock_read();
        InodeReadGuard { inode: self }
    }

    pub fn try_lock_read(&self) -> Option<InodeReadGuard<'_, 'c, D, P, N>> {
        self.lock()
            .try_lock_read()
            .then_some(InodeReadGuard { inode: self })
    }

    /// Takes the inode exclusively; blocks while anyone else holds it.
    pub fn lock_write(&self) -> InodeWriteGuard<'_, 'c, D, P, N> {
        self.lock().lock_write();
        InodeWriteGuard { inode: self }
    }

    pub fn try_lock_write(&self) -> Option<InodeWriteGuard<'_, 'c, D, P, N>> {
        self.lock()
            .try_lock_write()
            .then_some(InodeWriteGuard { inode: self })
    }

    fn kind(&self) -> u32 {
        self.get(inode_field::TYPE)
    }

    fn size(&self) -> u32 {
        self.get(inode_field::SIZE)
    }

    fn nlink(&self) -> u32 {
        self.get(inode_field::NLINK)
    }

    fn extent(&self, i: usize) -> Extent {
        assert!(i < NDIRECT, "direct extent {i} out of range");
        let at = inode_field::DIRECT + 8 * i;
        Extent {
            first: self.get(at),
            count: self.get(at + 4),
        }
    }

    /// Stores `fields` under the block's write token and queues the block for
    /// write-back.
    fn update(&self, fields: &[(usize, u32)]) {
        let mut w = self.block.get_write();
        for &(field, value) in fields {
            self.set(field, value);
        }
        w.mark_dirty();
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> core::fmt::Debug for Inode<'_, D, P, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("inum", &self.inum)
            .field("block", &self.block.block_number())
            .field("mlock", &self.lock_value())
            .finish_non_exhaustive()
    }
}

/// Shared access to an inode's fields.
#[must_use]
pub struct InodeReadGuard<'i, 'c, D: BlockDevice, P: PageSource, const N: usize> {
    inode: &'i Inode<'c, D, P, N>,
}

/// Exclusive access to an inode's fields.
#[must_use]
pub struct InodeWriteGuard<'i, 'c, D: BlockDevice, P: PageSource, const N: usize> {
    inode: &'i Inode<'c, D, P, N>,
}

macro_rules! inode_readers {
    ($guard:ident) => {
        impl<D: BlockDevice, P: PageSource, const N: usize> $guard<'_, '_, D, P, N> {
            /// Inode type, see [`inode_type`](crate::layout::inode_type).
            #[must_use]
            pub fn kind(&self) -> u32 {
                self.inode.kind()
            }

            #[must_use]
            pub fn size(&self) -> u32 {
                self.inode.size()
            }

            #[must_use]
            pub fn nlink(&self) -> u32 {
                self.inode.nlink()
            }

            /// Direct extent `i`.
            ///
            /// # Panics
            /// Panics if `i >= NDIRECT`.
            #[must_use]
            pub fn extent(&self, i: usize) -> Extent {
                self.inode.extent(i)
            }
        }
    };
}

inode_readers!(InodeReadGuard);
inode_readers!(InodeWriteGuard);

impl<D: BlockDevice, P: PageSource, const N: usize> InodeWriteGuard<'_, '_, D, P, N> {
    pub fn set_kind(&self, kind: u32) {
        self.inode.update(&[(inode_field::TYPE, kind)]);
    }

    pub fn set_size(&self, size: u32) {
        self.inode.update(&[(inode_field::SIZE, size)]);
    }

    pub fn set_nlink(&self, nlink: u32) {
        self.inode.update(&[(inode_field::NLINK, nlink)]);
    }

    /// # Panics
    /// Panics if `i >= NDIRECT`.
    pub fn set_extent(&self, i: usize, extent: Extent) {
        assert!(i < NDIRECT, "direct extent {i} out of range");
        let at = inode_field::DIRECT + 8 * i;
        self.inode
            .update(&[(at, extent.first), (at + 4, extent.count)]);
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> Drop for InodeReadGuard<'_, '_, D, P, N> {
    fn drop(&mut self) {
        self.inode.lock().unlock_read();
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> Drop for InodeWriteGuard<'_, '_, D, P, N> {
    fn drop(&mut self) {
        self.inode.lock().unlock_write();
    }
}

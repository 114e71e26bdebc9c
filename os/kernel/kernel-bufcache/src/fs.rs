//! # Filesystem State
//!
//! [`ChkFs`] ties the buffer cache to the on-disk layout: it reads the
//! superblock once at mount and then resolves inode numbers and allocates
//! blocks from the free block bitmap.

use crate::cache::BufCache;
use crate::disk::BlockDevice;
use crate::entry::BlockNum;
use crate::error::BufCacheError;
use crate::inode::{Inode, clean_inode_block};
use crate::layout::{INODES_PER_BLOCK, Inum, Superblock};
use kernel_alloc::PageSource;
use kernel_info::fs::BLOCK_SIZE;
use log::{debug, info};

/// Bitmap bits held by one block.
const BITS_PER_BLOCK: u32 = (BLOCK_SIZE * 8) as u32;

#[inline]
fn bit_is_set(bits: &[u8], bit: u32) -> bool {
    bits[bit as usize / 8] & (1 << (bit % 8)) != 0
}

#[inline]
fn clear_bit(bits: &mut [u8], bit: u32) {
    bits[bit as usize / 8] &= !(1 << (bit % 8));
}

/// First run of `count` set bits in `[start, end)`.
fn find_run(bits: &[u8], start: u32, end: u32, count: u32) -> Option<u32> {
    let mut run_start = start;
    let mut run_len = 0;
    for bit in start..end {
        if bit_is_set(bits, bit) {
            if run_len == 0 {
                run_start = bit;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

/// A mounted filesystem.
pub struct ChkFs<'c, D: BlockDevice, P: PageSource, const N: usize> {
    cache: &'c BufCache<D, P, N>,
    sb: Superblock,
}

impl<'c, D: BlockDevice, P: PageSource, const N: usize> ChkFs<'c, D, P, N> {
    /// Reads and validates the superblock.
    ///
    /// # Errors
    /// Cache errors while reading block 0, or [`BufCacheError::Corrupt`].
    pub fn mount(cache: &'c BufCache<D, P, N>) -> Result<Self, BufCacheError> {
        let sb = cache
            .get_disk_entry(0, None)?
            .with_data(Superblock::parse)?;
        info!(
            "chkfs: {} blocks, {} inodes, data at {}..{}",
            sb.nblocks, sb.ninodes, sb.data_bn, sb.journal_bn
        );
        Ok(Self { cache, sb })
    }

    #[must_use]
    pub const fn superblock(&self) -> &Superblock {
        &self.sb
    }

    #[must_use]
    pub const fn cache(&self) -> &'c BufCache<D, P, N> {
        self.cache
    }

    /// Returns inode `inum`, holding a reference on its block.
    ///
    /// `Ok(None)` for inode `0` (reserved) and numbers past the inode table.
    ///
    /// # Errors
    /// Cache errors while loading the inode block.
    pub fn get_inode(&self, inum: Inum) -> Result<Option<Inode<'c, D, P, N>>, BufCacheError> {
        if inum == 0 || inum >= self.sb.ninodes {
            return Ok(None);
        }
        let bn = self.sb.inode_bn + inum / INODES_PER_BLOCK as u32;
        let block = self.cache.get_disk_entry(bn, Some(clean_inode_block))?;
        Ok(Some(Inode::new(block, inum)))
    }

    /// Allocates `count` contiguous data blocks and returns the first.
    ///
    /// Searches the free block bitmap first-fit over the data region. An
    /// extent never spans two bitmap blocks.
    ///
    /// # Errors
    /// [`BufCacheError::NoSpace`] if no run is long enough, or cache errors
    /// while reading the bitmap.
    pub fn allocate_extent(&self, count: u32) -> Result<BlockNum, BufCacheError> {
        if count == 0 {
            return Err(BufCacheError::NoSpace(count));
        }

        let mut bn = self.sb.data_bn;
        while bn < self.sb.journal_bn {
            let base = bn / BITS_PER_BLOCK * BITS_PER_BLOCK;
            let end = self.sb.journal_bn.min(base + BITS_PER_BLOCK);
            let fbb = self
                .cache
                .get_disk_entry(self.sb.fbb_bn + bn / BITS_PER_BLOCK, None)?;

            let mut bits = fbb.get_write();
            if let Some(first) = find_run(&bits, bn - base, end - base, count) {
                for bit in first..first + count {
                    clear_bit(&mut bits, bit);
                }
                bits.mark_dirty();
                debug!("chkfs: allocated extent {}+{count}", base + first);
                return Ok(base + first);
            }
            drop(bits);
            bn = end;
        }
        Err(BufCacheError::NoSpace(count))
    }

    /// Returns the first inode number whose link count is zero.
    ///
    /// The inode is not reserved; the caller must claim it (for example by
    /// setting its link count under the write lock).
    ///
    /// # Errors
    /// Cache errors while loading inode blocks.
    pub fn allocate_inode(&self) -> Result<Option<Inum>, BufCacheError> {
        for inum in 1..self.sb.ninodes {
            let Some(inode) = self.get_inode(inum)? else {
                break;
            };
            if inode.lock_read().nlink() == 0 {
                return Ok(Some(inum));
            }
        }
        Ok(None)
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> core::fmt::Debug for ChkFs<'_, D, P, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChkFs").field("sb", &self.sb).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_search_is_first_fit() {
        // bits 1,2 set, 3 clear, 4..8 set
        let bits = [0b1111_0110u8, 0];
        assert_eq!(find_run(&bits, 0, 16, 1), Some(1));
        assert_eq!(find_run(&bits, 0, 16, 2), Some(1));
        assert_eq!(find_run(&bits, 0, 16, 3), Some(4));
        assert_eq!(find_run(&bits, 0, 16, 5), None);
        assert_eq!(find_run(&bits, 5, 16, 3), Some(5));
        assert_eq!(find_run(&bits, 5, 7, 3), None);
    }

    #[test]
    fn clearing_bits() {
        let mut bits = [0xffu8; 2];
        clear_bit(&mut bits, 9);
        assert_eq!(bits, [0xff, 0xfd]);
        assert!(!bit_is_set(&bits, 9));
        assert!(bit_is_set(&bits, 8));
    }
}

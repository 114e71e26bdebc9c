//! # On-Disk Layout
//!
//! ```text
//! block 0            superblock (at byte SUPERBLOCK_OFFSET)
//! swap_bn ..         swap area
//! fbb_bn ..          free block bitmap, one bit per block, 1 = free
//! inode_bn ..        inode table, INODES_PER_BLOCK inodes per block
//! data_bn ..         file data
//! journal_bn ..      journal
//! ```
//!
//! All integers are little-endian.

use crate::entry::BlockNum;
use crate::error::BufCacheError;
use kernel_info::fs::BLOCK_SIZE;

/// Byte offset of the superblock inside block 0; the bytes before it belong
/// to the boot sector.
pub const SUPERBLOCK_OFFSET: usize = 512;

/// Value of [`Superblock::magic`] on a formatted disk.
pub const MAGIC: u64 = 0xFBBF_BB00_3EE9_BEEF;

/// Size of an on-disk inode in bytes.
pub const INODE_SIZE: usize = 64;

pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// Number of direct extents in an inode.
pub const NDIRECT: usize = 4;

/// Inode number.
pub type Inum = u32;

/// Byte offsets of the inode fields.
pub mod inode_field {
    pub const TYPE: usize = 0;
    pub const SIZE: usize = 4;
    pub const NLINK: usize = 8;
    pub const FLAGS: usize = 12;
    /// In-memory lock word, see `kernel_sync::RwWord`.
    pub const MLOCK: usize = 16;
    pub const MREF: usize = 20;
    /// In-memory index of the cache slot holding the inode.
    pub const MBCINDEX: usize = 24;
    /// First of [`NDIRECT`](super::NDIRECT) `(first, count)` extents.
    pub const DIRECT: usize = 32;
}

/// Inode types.
pub mod inode_type {
    pub const FREE: u32 = 0;
    pub const REGULAR: u32 = 1;
    pub const DIRECTORY: u32 = 2;
}

const _: () = {
    assert!(SUPERBLOCK_OFFSET + Superblock::SIZE <= BLOCK_SIZE);
    assert!(inode_field::DIRECT + NDIRECT * 8 <= INODE_SIZE);
    assert!(inode_field::MLOCK.is_multiple_of(4));
    assert!(BLOCK_SIZE.is_multiple_of(INODE_SIZE));
};

#[inline]
pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

#[inline]
pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// A contiguous run of blocks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Extent {
    pub first: BlockNum,
    pub count: u32,
}

/// Parsed superblock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Superblock {
    pub magic: u64,
    pub nblocks: BlockNum,
    pub nswap: BlockNum,
    pub ninodes: Inum,
    pub njournal: BlockNum,
    pub swap_bn: BlockNum,
    pub fbb_bn: BlockNum,
    pub inode_bn: BlockNum,
    pub data_bn: BlockNum,
    pub journal_bn: BlockNum,
}

impl Superblock {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

    /// Decodes the superblock from the contents of block 0.
    ///
    /// # Errors
    /// [`BufCacheError::Corrupt`] if the magic number is wrong or the regions
    /// are out of order.
    pub fn parse(block0: &[u8]) -> Result<Self, BufCacheError> {
        let b = &block0[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + Self::SIZE];
        let mut magic = [0; 8];
        magic.copy_from_slice(&b[..8]);
        let sb = Self {
            magic: u64::from_le_bytes(magic),
            nblocks: read_u32(b, 8),
            nswap: read_u32(b, 12),
            ninodes: read_u32(b, 16),
            njournal: read_u32(b, 20),
            swap_bn: read_u32(b, 24),
            fbb_bn: read_u32(b, 28),
            inode_bn: read_u32(b, 32),
            data_bn: read_u32(b, 36),
            journal_bn: read_u32(b, 40),
        };
        sb.validate()?;
        Ok(sb)
    }

    /// Encodes the superblock into the contents of block 0.
    pub fn write_to(&self, block0: &mut [u8]) {
        let b = &mut block0[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + Self::SIZE];
        b[..8].copy_from_slice(&self.magic.to_le_bytes());
        for (i, v) in [
            self.nblocks,
            self.nswap,
            self.ninodes,
            self.njournal,
            self.swap_bn,
            self.fbb_bn,
            self.inode_bn,
            self.data_bn,
            self.journal_bn,
        ]
        .into_iter()
        .enumerate()
        {
            write_u32(b, 8 + 4 * i, v);
        }
    }

    fn validate(&self) -> Result<(), BufCacheError> {
        if self.magic != MAGIC {
            return Err(BufCacheError::Corrupt("bad magic number"));
        }
        if !(0 < self.fbb_bn
            && self.fbb_bn < self.inode_bn
            && self.inode_bn < self.data_bn
            && self.data_bn <= self.journal_bn
            && self.journal_bn <= self.nblocks)
        {
            return Err(BufCacheError::Corrupt("regions out of order"));
        }
        let inode_blocks = (self.ninodes as usize).div_ceil(INODES_PER_BLOCK);
        if (self.data_bn - self.inode_bn) as usize != inode_blocks {
            return Err(BufCacheError::Corrupt("inode table size mismatch"));
        }
        if self.nblocks as usize > (self.inode_bn - self.fbb_bn) as usize * BLOCK_SIZE * 8 {
            return Err(BufCacheError::Corrupt("free block bitmap too small"));
        }
        Ok(())
    }
}

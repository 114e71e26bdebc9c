#![allow(dead_code)]

use kernel_alloc::phys_mapper::OffsetPhysMapper;
use kernel_alloc::{AllocError, FillPolicy, PageAllocator, PageSource};
use kernel_bufcache::layout::{
    INODE_SIZE, INODES_PER_BLOCK, MAGIC, Superblock, inode_field, inode_type,
};
use kernel_bufcache::{BlockDevice, BlockNum, BufCache, DiskError};
use kernel_info::fs::BLOCK_SIZE;
use kernel_info::memory::PAGE_SIZE;
use kernel_info::memory_map::{MemoryRange, MemoryType, PhysicalRanges};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory disk that records every transfer.
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    reads: Mutex<Vec<BlockNum>>,
    writes: Mutex<Vec<BlockNum>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

impl MemDisk {
    /// A disk of `nblocks` blocks where every byte of block `b` is `b as u8`.
    pub fn patterned(nblocks: usize) -> Self {
        let mut data = vec![0u8; nblocks * BLOCK_SIZE];
        for (b, block) in data.chunks_mut(BLOCK_SIZE).enumerate() {
            block.fill(b as u8);
        }
        Self::from_image(data)
    }

    pub fn from_image(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_delay: None,
            write_delay: None,
        }
    }

    #[must_use]
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn reads(&self) -> Vec<BlockNum> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<BlockNum> {
        self.writes.lock().unwrap().clone()
    }

    pub fn block(&self, bn: BlockNum) -> Vec<u8> {
        let start = bn as usize * BLOCK_SIZE;
        self.data.lock().unwrap()[start..start + BLOCK_SIZE].to_vec()
    }
}

impl BlockDevice for MemDisk {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<(), DiskError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DiskError::Device(0x51));
        }
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        let data = self.data.lock().unwrap();
        let start = offset as usize;
        let src = data
            .get(start..start + buf.len())
            .ok_or(DiskError::OutOfRange(offset))?;
        buf.copy_from_slice(src);
        self.reads
            .lock()
            .unwrap()
            .push((offset / BLOCK_SIZE as u64) as BlockNum);
        Ok(())
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<(), DiskError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DiskError::NoDevice);
        }
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        let mut data = self.data.lock().unwrap();
        let start = offset as usize;
        data.get_mut(start..start + buf.len())
            .ok_or(DiskError::OutOfRange(offset))?
            .copy_from_slice(buf);
        self.writes
            .lock()
            .unwrap()
            .push((offset / BLOCK_SIZE as u64) as BlockNum);
        Ok(())
    }
}

/// The kernel page allocator over a heap arena of `pages` pages.
pub struct TestPages {
    alloc: PageAllocator<OffsetPhysMapper>,
    base: *mut u8,
    layout: Layout,
}

unsafe impl Send for TestPages {}
unsafe impl Sync for TestPages {}

impl TestPages {
    pub fn new(pages: usize) -> Self {
        let len = pages * PAGE_SIZE;
        let layout = Layout::from_size_align(len, PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        let alloc = PageAllocator::with_fill(
            unsafe { OffsetPhysMapper::new(base, len) },
            FillPolicy::default(),
        );
        alloc.init(&PhysicalRanges::new(&[MemoryRange::new(
            0,
            len as u64,
            MemoryType::Available,
        )]));
        Self {
            alloc,
            base,
            layout,
        }
    }

    pub fn free_bytes(&self) -> usize {
        self.alloc.stats().free
    }
}

impl PageSource for TestPages {
    fn alloc_page(&self) -> Result<NonNull<u8>, AllocError> {
        self.alloc.alloc_page()
    }

    fn free_page(&self, page: NonNull<u8>) {
        self.alloc.free_page(page);
    }
}

impl Drop for TestPages {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}

pub type Cache<'a, const N: usize> = BufCache<&'a MemDisk, &'a TestPages, N>;

pub fn install_yield() {
    kernel_sync::set_yield_hook(std::thread::yield_now);
}

/// Geometry of the test filesystem image.
pub const SB: Superblock = Superblock {
    magic: MAGIC,
    nblocks: 64,
    nswap: 0,
    ninodes: 128,
    njournal: 8,
    swap_bn: 1,
    fbb_bn: 1,
    inode_bn: 2,
    data_bn: 4,
    journal_bn: 56,
};

fn put_u32(image: &mut [u8], at: usize, v: u32) {
    image[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// A formatted image: inodes 1 (root directory) and 2 are in use, every data
/// block is free, and the on-disk lock words hold garbage.
pub fn format() -> Vec<u8> {
    let mut image = vec![0u8; SB.nblocks as usize * BLOCK_SIZE];
    SB.write_to(&mut image[..BLOCK_SIZE]);

    let fbb = SB.fbb_bn as usize * BLOCK_SIZE;
    for bn in SB.data_bn..SB.journal_bn {
        image[fbb + bn as usize / 8] |= 1 << (bn % 8);
    }

    for inum in 0..SB.ninodes as usize {
        let at = SB.inode_bn as usize * BLOCK_SIZE + inum * INODE_SIZE;
        put_u32(&mut image, at + inode_field::MLOCK, 0xdead_beef);
        put_u32(&mut image, at + inode_field::MBCINDEX, 0xffff);
    }
    for (inum, kind, size) in [(1, inode_type::DIRECTORY, 128), (2, inode_type::REGULAR, 5000)] {
        let at = SB.inode_bn as usize * BLOCK_SIZE + inum * INODE_SIZE;
        put_u32(&mut image, at + inode_field::TYPE, kind);
        put_u32(&mut image, at + inode_field::SIZE, size);
        put_u32(&mut image, at + inode_field::NLINK, 1);
    }
    assert_eq!(INODES_PER_BLOCK, 64);
    image
}

//! # Kernel Buffer Cache
//!
//! A write-back cache of fixed-size disk blocks for the kernel's filesystem,
//! and the inode layer built on it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     ChkFs                           │
//! │    • Superblock, inode lookup                       │
//! │    • Extent and inode allocation                    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ Inode (RwWord lock in the buffer)
//! ┌─────────────────▼───────────────────────────────────┐
//! │                    BufCache                         │
//! │    • N slots + superblock slot, LRU eviction        │
//! │    • Read coalescing, write tokens, dirty set       │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │ one page per block          │ whole-block I/O
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │  PageSource         │       │  BlockDevice          │
//! │  (kernel-alloc)     │       │  (disk driver)        │
//! └─────────────────────┘       └───────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_bufcache::{BlockDevice, BufCache, DiskError};
//! use kernel_alloc::{AllocError, PageSource};
//! use kernel_info::fs::BLOCK_SIZE;
//! use std::alloc::{Layout, alloc_zeroed, dealloc};
//! use std::ptr::NonNull;
//!
//! struct ZeroDisk;
//!
//! impl BlockDevice for ZeroDisk {
//!     fn read(&self, buf: &mut [u8], _offset: u64) -> Result<(), DiskError> {
//!         buf.fill(0);
//!         Ok(())
//!     }
//!     fn write(&self, _buf: &[u8], _offset: u64) -> Result<(), DiskError> {
//!         Ok(())
//!     }
//! }
//!
//! struct HeapPages;
//!
//! impl PageSource for HeapPages {
//!     fn alloc_page(&self) -> Result<NonNull<u8>, AllocError> {
//!         let layout = Layout::from_size_align(BLOCK_SIZE, BLOCK_SIZE).unwrap();
//!         NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(AllocError::OutOfMemory)
//!     }
//!     fn free_page(&self, page: NonNull<u8>) {
//!         let layout = Layout::from_size_align(BLOCK_SIZE, BLOCK_SIZE).unwrap();
//!         unsafe { dealloc(page.as_ptr(), layout) };
//!     }
//! }
//!
//! let cache = BufCache::<_, _, 8>::new(ZeroDisk, HeapPages);
//! let block = cache.get_disk_entry(7, None).unwrap();
//! {
//!     let mut w = block.get_write();
//!     w[0] = 42;
//!     w.mark_dirty();
//! }
//! drop(block);
//! assert_eq!(cache.dirty_count(), 1);
//! cache.sync(1).unwrap();
//! assert!(cache.lookup(7).is_none());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod cache;
mod dirty;
pub mod disk;
mod entry;
mod error;
pub mod fs;
pub mod inode;
pub mod layout;
mod lru;

pub use cache::{BlockRef, BlockWriteGuard, BufCache, Cleaner};
pub use disk::{BlockDevice, DiskError};
pub use entry::{BcEntry, BlockNum, EntryState};
pub use error::BufCacheError;
pub use fs::ChkFs;
pub use inode::{Inode, InodeReadGuard, InodeWriteGuard, clean_inode_block};

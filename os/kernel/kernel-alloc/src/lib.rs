//! # Kernel Physical Page Allocation
//!
//! This crate implements the kernel's physical page allocator: a binary buddy
//! system over a fixed span of physical memory. Blocks are powers of two in
//! size, from one page (`MIN_ORDER`) up to `MAX_ORDER`, and are always aligned
//! to their own size.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              PageAllocator (kalloc / kfree)         │
//! │    • Spin lock around the page set                  │
//! │    • Fill policy for fresh blocks                   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • Physical address ⇄ kernel pointer              │
//! │    • HHDM in the kernel, offset arena in tests      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                  PageSet                            │
//! │    • Page descriptor table (status + order)         │
//! │    • One free list per order                        │
//! │    • Split on allocate, merge on free               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Page Set ([`page_set`])
//! The buddy engine. It never touches the memory it manages, so it can be
//! exercised without any backing storage at all.
//!
//! ### Block Arithmetic ([`block`])
//! Bounds, buddy and parent of a block, derived from an address and an order.
//!
//! ### Physical Mapper ([`phys_mapper`])
//! Conversion between physical addresses and pointers.
//!
//! ### Page Allocator ([`page_alloc`])
//! The locked front end handing out pointers.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FillPolicy, PageAllocator};
//! use kernel_alloc::phys_mapper::OffsetPhysMapper;
//! use kernel_info::memory::PAGE_SIZE;
//! use kernel_info::memory_map::{MemoryRange, MemoryType, PhysicalRanges};
//! use std::alloc::{Layout, alloc, dealloc};
//!
//! let len = 16 * PAGE_SIZE;
//! let layout = Layout::from_size_align(len, PAGE_SIZE).unwrap();
//! let arena = unsafe { alloc(layout) };
//!
//! let mapper = unsafe { OffsetPhysMapper::new(arena, len) };
//! let pages = PageAllocator::with_fill(mapper, FillPolicy::Zero);
//! let ranges = [MemoryRange::new(0, len as u64, MemoryType::Available)];
//! pages.init(&PhysicalRanges::new(&ranges));
//!
//! let p = pages.kalloc(100).unwrap();
//! assert_eq!(unsafe { *p.as_ptr() }, 0);
//! pages.kfree(p.as_ptr());
//! assert_eq!(pages.stats().free, len);
//!
//! unsafe { dealloc(arena, layout) };
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod addr;
pub mod block;
mod error;
mod free_list;
pub mod page_alloc;
pub mod page_set;
pub mod phys_mapper;

pub use addr::PhysAddr;
pub use error::{AllocError, InvariantViolation};
pub use page_alloc::{FillPolicy, PageAllocator, PageSource};
pub use page_set::{PageSet, PageStats, PageStatus};
pub use phys_mapper::PhysMapper;

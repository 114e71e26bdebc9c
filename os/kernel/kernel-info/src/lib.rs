//! # Kernel Configuration
//!
//! This crate is the single source of truth for the compile-time parameters
//! shared by the memory and filesystem subsystems of the kernel, and for the
//! boot-time description of physical memory the allocator consumes.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! * **Page geometry**: [`PAGE_SIZE`](memory::PAGE_SIZE) and the buddy order
//!   range [`MIN_ORDER`](memory::MIN_ORDER) ..= [`MAX_ORDER`](memory::MAX_ORDER)
//! * **Managed span**: [`PHYS_PAGES_COUNT`](memory::PHYS_PAGES_COUNT), the size
//!   of the page descriptor table
//! * **Direct map**: [`HHDM_BASE`](memory::HHDM_BASE) for physical-to-virtual
//!   translation
//!
//! ### Physical Memory Map ([`memory_map`])
//! The bootloader hands the kernel a list of tagged physical ranges. The buddy
//! allocator only ever manages pages tagged [`MemoryType::Available`](memory_map::MemoryType::Available).
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────┐
//!             │ Reserved (BIOS, IVT)     │
//!             ├──────────────────────────┤
//!             │ Available                │ ← buddy allocator
//!             ├──────────────────────────┤
//!             │ Kernel image             │
//!             ├──────────────────────────┤
//!             │ Available                │ ← buddy allocator
//!             ├──────────────────────────┤
//!             │ Console / MMIO           │
//! limit()     └──────────────────────────┘
//! ```
//!
//! ### Filesystem ([`fs`])
//! * **Block size**: [`BLOCK_SIZE`](fs::BLOCK_SIZE), always equal to the page size
//!   so that one allocator page backs exactly one cached block
//! * **Cache capacity**: [`BUFCACHE_ENTRIES`](fs::BUFCACHE_ENTRIES)
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::{MAX_ORDER, MIN_ORDER, PAGE_SIZE};
//! use kernel_info::memory_map::{MemoryRange, MemoryType, PhysicalRanges};
//!
//! let ranges = [
//!     MemoryRange::new(0, PAGE_SIZE as u64, MemoryType::Reserved),
//!     MemoryRange::new(PAGE_SIZE as u64, 1 << MAX_ORDER, MemoryType::Available),
//! ];
//! let map = PhysicalRanges::new(&ranges);
//! assert_eq!(map.type_of(0), MemoryType::Reserved);
//! assert_eq!(map.type_of(1 << MIN_ORDER), MemoryType::Available);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod errno;
pub mod fs;
pub mod memory;
pub mod memory_map;

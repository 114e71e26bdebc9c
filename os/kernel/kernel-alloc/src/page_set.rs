//! # Buddy Page Set
//!
//! [`PageSet`] owns the page descriptor table and the per-order free lists of
//! a fixed physical span of [`PHYS_PAGES_COUNT`] pages.
//!
//! ## Model
//! Each page records a status and the order of the block it belongs to. Every
//! page of a block carries the same status and order, and a block of order
//! `o` starts at a multiple of `2^o`. Only the first page of a free block is
//! linked on a free list.
//!
//! - **Allocation** pops the smallest sufficient free block and splits it
//!   down, returning right halves to the smaller lists.
//! - **Deallocation** returns the block to its list and merges it with its
//!   buddy for as long as the buddy is an equally sized free block.
//!
//! The set itself is not synchronized; [`PageAllocator`](crate::PageAllocator)
//! wraps it in a spin lock.

use crate::addr::PhysAddr;
use crate::block::{Block, order_for_size};
use crate::error::{AllocError, InvariantViolation};
use crate::free_list::FreeLists;
use bitfield_struct::bitfield;
use kernel_info::memory::{MAX_ORDER, MIN_ORDER, PAGE_SIZE, PHYS_PAGES_COUNT};
use kernel_info::memory_map::{MemoryType, PhysicalRanges};
use log::{info, trace, warn};

/// State of a physical page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PageStatus {
    /// Not backed by available memory; never linked, never handed out.
    Unavailable = 0,
    Free = 1,
    Allocated = 2,
}

impl PageStatus {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Free,
            2 => Self::Allocated,
            _ => Self::Unavailable,
        }
    }
}

/// Page descriptor, one byte per page.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
struct Page {
    /// Order of the block the page belongs to.
    #[bits(6)]
    order: u8,
    #[bits(2)]
    status: PageStatus,
}

impl Page {
    const UNAVAILABLE: Self = Self::of(PageStatus::Unavailable, MIN_ORDER);

    #[allow(clippy::cast_possible_truncation)]
    const fn of(status: PageStatus, order: u32) -> Self {
        Self::new().with_status(status).with_order(order as u8)
    }

    fn block_order(self) -> u32 {
        u32::from(self.order())
    }
}

/// Byte counts per page status.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PageStats {
    pub free: usize,
    pub allocated: usize,
    pub unavailable: usize,
}

impl PageStats {
    /// Bytes of available memory, free or allocated.
    #[must_use]
    pub const fn available(&self) -> usize {
        self.free + self.allocated
    }
}

/// The buddy allocator engine.
pub struct PageSet {
    pages: [Page; PHYS_PAGES_COUNT],
    free: FreeLists,
    initialized: bool,
}

impl Default for PageSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSet {
    /// An empty set where every page is unavailable.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pages: [Page::UNAVAILABLE; PHYS_PAGES_COUNT],
            free: FreeLists::new(),
            initialized: false,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Takes ownership of every page that is entirely
    /// [`Available`](MemoryType::Available) in `ranges`, then merges the free
    /// pages into maximal blocks.
    ///
    /// # Panics
    /// Panics if called twice.
    pub fn init(&mut self, ranges: &PhysicalRanges<'_>) {
        assert!(!self.initialized, "page set initialized twice");

        let capacity = (PHYS_PAGES_COUNT * PAGE_SIZE) as u64;
        if ranges.limit() > capacity {
            warn!(
                "physical memory ends at {:#x}; only the first {capacity:#x} bytes are managed",
                ranges.limit()
            );
        }

        for index in 0..PHYS_PAGES_COUNT {
            let first = PhysAddr::from_page_index(index);
            let last = first + (PAGE_SIZE as u64 - 1);
            if ranges.type_of(first.as_u64()) == MemoryType::Available
                && ranges.type_of(last.as_u64()) == MemoryType::Available
            {
                self.pages[index] = Page::of(PageStatus::Free, MIN_ORDER);
                self.free.push_back(MIN_ORDER, index);
            }
        }
        self.initialized = true;

        let merges = self.try_merge_all();
        let stats = self.stats();
        info!(
            "page allocator: {} KiB free, {} KiB unavailable ({merges} merges)",
            stats.free / 1024,
            stats.unavailable / 1024
        );
    }

    /// Runs [`try_merge`](Self::try_merge) over every page. Returns the number
    /// of merges performed; `0` means the set is already maximally merged.
    pub fn try_merge_all(&mut self) -> usize {
        (0..PHYS_PAGES_COUNT)
            .map(|index| self.try_merge(PhysAddr::from_page_index(index)))
            .sum()
    }

    /// Merges the free block containing `pa` with its buddy, repeatedly, while
    /// both halves are free blocks of the same order. Returns the number of
    /// merges.
    pub fn try_merge(&mut self, pa: PhysAddr) -> usize {
        let Some(page) = self.page(pa) else {
            return 0;
        };
        if page.status() != PageStatus::Free {
            return 0;
        }

        let block = Block::containing(pa, page.block_order());
        let Some(parent) = block.parent() else {
            return 0;
        };
        let buddy = block.buddy();
        if !self.is_free_block(block) || !self.is_free_block(buddy) {
            return 0;
        }

        self.free.erase(block.order(), block.first_page());
        self.free.erase(buddy.order(), buddy.first_page());
        self.set_block(parent, PageStatus::Free);
        self.free.push_back(parent.order(), parent.first_page());
        trace!(
            "merged {} and {} into order {}",
            block.first(),
            buddy.first(),
            parent.order()
        );

        1 + self.try_merge(parent.first())
    }

    /// Allocates the smallest block that holds `size` bytes and returns its
    /// first address.
    ///
    /// # Errors
    /// - [`AllocError::ZeroSize`] for `size == 0`
    /// - [`AllocError::TooLarge`] if no order can hold `size`
    /// - [`AllocError::OutOfMemory`] if no sufficiently large block is free
    ///
    /// A failed call leaves the set unchanged.
    pub fn allocate(&mut self, size: usize) -> Result<PhysAddr, AllocError> {
        let order = match order_for_size(size) {
            Some(order) => order,
            None if size == 0 => return Err(AllocError::ZeroSize),
            None => return Err(AllocError::TooLarge(size)),
        };

        let (found, page) = (order..=MAX_ORDER)
            .find_map(|o| self.free.pop_front(o).map(|page| (o, page)))
            .ok_or(AllocError::OutOfMemory)?;
        let pa = PhysAddr::from_page_index(page);

        for o in (order..found).rev() {
            let right = Block::containing(pa, o).buddy();
            self.set_block(right, PageStatus::Free);
            self.free.push_back(o, right.first_page());
        }
        self.set_block(Block::containing(pa, order), PageStatus::Allocated);

        if found > order {
            trace!("split order-{found} block at {pa} down to order {order}");
        }
        Ok(pa)
    }

    /// Returns the allocated block starting at `pa` and merges it.
    ///
    /// # Errors
    /// - [`AllocError::NotManaged`] if `pa` is beyond the table or unavailable
    /// - [`AllocError::NotBlockStart`] if `pa` is not the first address of an
    ///   allocated block
    ///
    /// The set is unchanged on error.
    ///
    /// # Panics
    /// Panics if the block is already free.
    pub fn free(&mut self, pa: PhysAddr) -> Result<(), AllocError> {
        let page = self.page(pa).ok_or(AllocError::NotManaged(pa))?;
        if !pa.is_page_aligned() {
            return Err(AllocError::NotBlockStart(pa));
        }

        match page.status() {
            PageStatus::Unavailable => Err(AllocError::NotManaged(pa)),
            PageStatus::Free => panic!("double free of {pa}"),
            PageStatus::Allocated => {
                let block = Block::containing(pa, page.block_order());
                if block.first() != pa {
                    return Err(AllocError::NotBlockStart(pa));
                }
                self.set_block(block, PageStatus::Free);
                self.free.push_back(block.order(), block.first_page());
                self.try_merge(pa);
                Ok(())
            }
        }
    }

    /// The block containing `pa` and its status.
    #[must_use]
    pub fn block(&self, pa: PhysAddr) -> Option<(Block, PageStatus)> {
        self.page(pa)
            .map(|page| (Block::containing(pa, page.block_order()), page.status()))
    }

    #[must_use]
    pub fn stats(&self) -> PageStats {
        self.pages
            .iter()
            .fold(PageStats::default(), |mut stats, page| {
                match page.status() {
                    PageStatus::Free => stats.free += PAGE_SIZE,
                    PageStatus::Allocated => stats.allocated += PAGE_SIZE,
                    PageStatus::Unavailable => stats.unavailable += PAGE_SIZE,
                }
                stats
            })
    }

    /// Number of free blocks of `order`.
    #[must_use]
    pub const fn free_count(&self, order: u32) -> usize {
        self.free.len(order)
    }

    /// First addresses of the free blocks of `order`, in list order.
    pub fn free_blocks(&self, order: u32) -> impl Iterator<Item = PhysAddr> + '_ {
        self.free.iter(order).map(PhysAddr::from_page_index)
    }

    /// Logs, per order, the number of free blocks and the first `count` of them.
    pub fn dump_free_blocks(&self, count: usize) {
        for order in MIN_ORDER..=MAX_ORDER {
            let n = self.free_count(order);
            if n == 0 {
                continue;
            }
            trace!("order {order}: {n} free");
            for (i, pa) in self.free_blocks(order).take(count).enumerate() {
                trace!("  #{i}: {pa}..={}", Block::containing(pa, order).last());
            }
        }
    }

    /// Walks the whole table and verifies that blocks are aligned and uniform,
    /// that exactly the free blocks are linked, and that no two free buddies
    /// of equal order were left unmerged.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut index = 0;
        while index < PHYS_PAGES_COUNT {
            let page = self.pages[index];
            let order = page.block_order();
            if !(MIN_ORDER..=MAX_ORDER).contains(&order) {
                return Err(InvariantViolation::BadOrder { page: index, order });
            }

            let first = PhysAddr::from_page_index(index);
            let block = Block::containing(first, order);
            if block.first() != first {
                return Err(InvariantViolation::Misaligned { page: index, order });
            }
            if self.block_pages(block).iter().any(|p| *p != page) {
                return Err(InvariantViolation::Inconsistent { first, order });
            }

            let linked = self.free.linked_order(index);
            if page.status() == PageStatus::Free {
                if linked != Some(order) {
                    return Err(InvariantViolation::Unlinked { first, order });
                }
                let buddy = block.buddy();
                if block.parent().is_some() && self.is_free_block(buddy) {
                    return Err(InvariantViolation::Unmerged {
                        first,
                        buddy: buddy.first(),
                        order,
                    });
                }
            } else if linked.is_some() {
                return Err(InvariantViolation::StrayLink { page: index });
            }

            if let Some(page) =
                (index + 1..index + block.pages()).find(|&p| self.free.linked_order(p).is_some())
            {
                return Err(InvariantViolation::StrayLink { page });
            }

            index += block.pages();
        }
        Ok(())
    }

    fn page(&self, pa: PhysAddr) -> Option<Page> {
        if pa.as_u64() >= (PHYS_PAGES_COUNT * PAGE_SIZE) as u64 {
            return None;
        }
        self.pages.get(pa.page_index()).copied()
    }

    fn block_pages(&self, block: Block) -> &[Page] {
        &self.pages[block.first_page()..block.first_page() + block.pages()]
    }

    fn is_free_block(&self, block: Block) -> bool {
        self.block_pages(block)
            .iter()
            .all(|p| p.status() == PageStatus::Free && p.block_order() == block.order())
    }

    fn set_block(&mut self, block: Block, status: PageStatus) {
        let page = Page::of(status, block.order());
        self.pages[block.first_page()..block.first_page() + block.pages()].fill(page);
    }
}

impl core::fmt::Debug for PageSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut counts = [0usize; kernel_info::memory::ORDER_COUNT];
        for (slot, order) in (MIN_ORDER..=MAX_ORDER).enumerate() {
            counts[slot] = self.free_count(order);
        }
        f.debug_struct("PageSet")
            .field("initialized", &self.initialized)
            .field("stats", &self.stats())
            .field("free_per_order", &counts)
            .finish_non_exhaustive()
    }
}

//! # Kernel Page Allocator
//!
//! [`PageAllocator`] is the `kalloc`/`kfree` front end: a [`PageSet`] behind a
//! [`SpinLock`], a [`PhysMapper`] to turn block addresses into pointers, and a
//! [`FillPolicy`] applied to every fresh block.
//!
//! Allocation never blocks; running out of memory is an ordinary error.
//!
//! [`PageSource`] is the single-page view of an allocator used by clients such
//! as the buffer cache.

use crate::addr::PhysAddr;
use crate::block::order_for_size;
use crate::error::AllocError;
use crate::page_set::{PageSet, PageStats};
use crate::phys_mapper::PhysMapper;
use core::ptr::NonNull;
use kernel_info::memory::PAGE_SIZE;
use kernel_info::memory_map::PhysicalRanges;
use kernel_sync::SpinLock;
use log::{debug, warn};

/// What a freshly allocated block is filled with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FillPolicy {
    /// Leave whatever the previous owner wrote.
    None,
    Zero,
    /// Fill every byte with the given value.
    Pattern(u8),
}

impl FillPolicy {
    /// Byte written to fresh blocks by default; makes reads of uninitialized
    /// memory easy to spot.
    pub const DEBUG_BYTE: u8 = 0xCC;

    const fn byte(self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Zero => Some(0),
            Self::Pattern(b) => Some(b),
        }
    }
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self::Pattern(Self::DEBUG_BYTE)
    }
}

/// A provider of single pages for subsystems that need backing memory but
/// not the full allocator interface.
pub trait PageSource {
    /// Allocates one page.
    ///
    /// # Errors
    /// Returns [`AllocError::OutOfMemory`] if no page is free.
    fn alloc_page(&self) -> Result<NonNull<u8>, AllocError>;

    /// Returns a page obtained from [`alloc_page`](Self::alloc_page).
    fn free_page(&self, page: NonNull<u8>);
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn alloc_page(&self) -> Result<NonNull<u8>, AllocError> {
        (**self).alloc_page()
    }

    fn free_page(&self, page: NonNull<u8>) {
        (**self).free_page(page);
    }
}

/// Thread-safe buddy page allocator.
pub struct PageAllocator<M> {
    pages: SpinLock<PageSet>,
    mapper: M,
    fill: FillPolicy,
}

impl<M: PhysMapper> PageAllocator<M> {
    /// An allocator with no memory yet; call [`init`](Self::init).
    #[must_use]
    pub const fn new(mapper: M) -> Self {
        Self::with_fill(mapper, FillPolicy::Pattern(FillPolicy::DEBUG_BYTE))
    }

    #[must_use]
    pub const fn with_fill(mapper: M, fill: FillPolicy) -> Self {
        Self {
            pages: SpinLock::new(PageSet::new()),
            mapper,
            fill,
        }
    }

    /// Hands the available pages of `ranges` to the allocator.
    ///
    /// # Panics
    /// Panics if called twice.
    pub fn init(&self, ranges: &PhysicalRanges<'_>) {
        self.pages.with_lock(|pages| pages.init(ranges));
    }

    /// Allocates a block of at least `size` bytes.
    ///
    /// The block is naturally aligned to its (power-of-two) size and filled
    /// according to the allocator's [`FillPolicy`].
    ///
    /// # Errors
    /// See [`PageSet::allocate`].
    pub fn kalloc(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let pa = self.pages.with_lock(|pages| pages.allocate(size))?;
        let ptr = self.mapper.phys_to_ptr(pa);
        let Some(ptr) = NonNull::new(ptr) else {
            self.pages.with_lock(|pages| pages.free(pa))?;
            return Err(AllocError::NotManaged(pa));
        };

        if let (Some(byte), Some(order)) = (self.fill.byte(), order_for_size(size)) {
            // SAFETY: the block was just handed out and is owned exclusively by
            // this call until returned.
            unsafe { ptr.as_ptr().write_bytes(byte, 1 << order) };
        }
        Ok(ptr)
    }

    /// Returns a block obtained from [`kalloc`](Self::kalloc).
    ///
    /// Null is a no-op. Pointers that do not start an allocated block are
    /// logged and ignored.
    ///
    /// # Panics
    /// Panics on a double free.
    pub fn kfree(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let Some(pa) = self.mapper.ptr_to_phys(ptr) else {
            warn!("kfree: {ptr:p} is outside physical memory; ignored");
            return;
        };
        if let Err(e) = self.pages.with_lock(|pages| pages.free(pa)) {
            warn!("kfree: {e}; ignored");
        }
    }

    /// Physical address behind a pointer returned by [`kalloc`](Self::kalloc).
    pub fn phys_of(&self, ptr: *const u8) -> Option<PhysAddr> {
        self.mapper.ptr_to_phys(ptr)
    }

    #[must_use]
    pub fn stats(&self) -> PageStats {
        self.pages.with_lock(|pages| pages.stats())
    }

    /// Runs `f` with the page set locked.
    pub fn with_pages<R>(&self, f: impl FnOnce(&PageSet) -> R) -> R {
        self.pages.with_lock(|pages| f(pages))
    }

    /// Logs the free lists at `trace` level.
    pub fn dump_free_blocks(&self, count: usize) {
        self.pages.with_lock(|pages| {
            debug!("{pages:?}");
            pages.dump_free_blocks(count);
        });
    }

    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    pub const fn fill_policy(&self) -> FillPolicy {
        self.fill
    }
}

impl<M: PhysMapper> PageSource for PageAllocator<M> {
    fn alloc_page(&self) -> Result<NonNull<u8>, AllocError> {
        self.kalloc(PAGE_SIZE)
    }

    fn free_page(&self, page: NonNull<u8>) {
        self.kfree(page.as_ptr());
    }
}

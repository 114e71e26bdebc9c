//! # Physical-to-Virtual Translation
//!
//! The page allocator hands out *physical* blocks but its callers need
//! pointers. A [`PhysMapper`] converts between the two.
//!
//! ## Mappers
//! - [`HhdmPhysMapper`]: the kernel's higher-half direct map, where every
//!   physical address is visible at `HHDM_BASE + pa`.
//! - [`OffsetPhysMapper`]: physical address `0` is placed at an arbitrary base
//!   pointer. Used when the "physical" memory is a buffer owned by someone
//!   else, such as a hosted test arena.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::{PhysAddr, PhysMapper};
//! use kernel_alloc::phys_mapper::OffsetPhysMapper;
//!
//! let mut arena = [0u8; 64];
//! let mapper = unsafe { OffsetPhysMapper::new(arena.as_mut_ptr(), arena.len()) };
//! let p = mapper.phys_to_ptr(PhysAddr::from_u64(16));
//! assert_eq!(mapper.ptr_to_phys(p), Some(PhysAddr::from_u64(16)));
//! ```

use crate::addr::PhysAddr;
use kernel_info::memory::HHDM_BASE;

/// Converts between physical addresses and kernel pointers.
pub trait PhysMapper {
    /// Pointer through which the kernel accesses `pa`.
    ///
    /// Producing the pointer is always safe; dereferencing it is only valid if
    /// `pa` is backed by memory the caller owns.
    fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8;

    /// Physical address behind `ptr`, or `None` if `ptr` is outside the
    /// mapped window.
    fn ptr_to_phys(&self, ptr: *const u8) -> Option<PhysAddr>;
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// - The HHDM mapping must be present and cover the referenced physical range.
#[derive(Copy, Clone, Debug, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8 {
        (HHDM_BASE + pa.as_u64()) as *mut u8
    }

    #[inline]
    fn ptr_to_phys(&self, ptr: *const u8) -> Option<PhysAddr> {
        (ptr as u64).checked_sub(HHDM_BASE).map(PhysAddr::from_u64)
    }
}

/// [`PhysMapper`] placing physical address `0` at `base`.
#[derive(Debug)]
pub struct OffsetPhysMapper {
    base: *mut u8,
    len: usize,
}

// Safety: the mapper only performs address arithmetic; whoever dereferences
// the produced pointers synchronizes access.
unsafe impl Send for OffsetPhysMapper {}
unsafe impl Sync for OffsetPhysMapper {}

impl OffsetPhysMapper {
    /// Maps physical `[0, len)` onto `[base, base + len)`.
    ///
    /// # Safety
    /// `base` must be valid for reads and writes of `len` bytes for as long as
    /// pointers produced by this mapper are dereferenced.
    #[must_use]
    pub const unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }

    /// Size of the mapped window in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PhysMapper for OffsetPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8 {
        self.base.wrapping_add(pa.as_u64() as usize)
    }

    fn ptr_to_phys(&self, ptr: *const u8) -> Option<PhysAddr> {
        let offset = (ptr as usize).checked_sub(self.base as usize)?;
        (offset < self.len).then(|| PhysAddr::from_u64(offset as u64))
    }
}

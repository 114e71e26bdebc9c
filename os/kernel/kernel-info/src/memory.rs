//! # Memory Layout

/// Size of a physical page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Smallest buddy order, i.e. `log2(PAGE_SIZE)`.
///
/// Orders are expressed as the base-2 logarithm of a block's size in **bytes**,
/// so an order-`MIN_ORDER` block is exactly one page.
pub const MIN_ORDER: u32 = 12;

/// Largest buddy order (inclusive). Blocks of this order have no parent.
pub const MAX_ORDER: u32 = 21;

/// Number of distinct buddy orders and therefore free lists.
pub const ORDER_COUNT: usize = (MAX_ORDER - MIN_ORDER + 1) as usize;

/// Number of physical pages described by the page descriptor table.
///
/// Physical memory above `PHYS_PAGES_COUNT * PAGE_SIZE` is never managed.
pub const PHYS_PAGES_COUNT: usize = 512;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(1 << MIN_ORDER == PAGE_SIZE);
    assert!(MAX_ORDER >= MIN_ORDER);
    assert!((PHYS_PAGES_COUNT * PAGE_SIZE).is_multiple_of(1 << MAX_ORDER));
    assert!(PHYS_PAGES_COUNT <= u32::MAX as usize);
};

//! # Physical Memory Map
//!
//! The bootloader describes physical memory as a list of tagged,
//! non-overlapping ranges. Addresses not covered by any range are
//! [`MemoryType::Nonexistent`].

/// Classification of a physical address range.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryType {
    /// No memory is present at this address.
    Nonexistent = 0,
    /// General-purpose RAM the page allocator may hand out.
    Available = 1,
    /// Occupied by the kernel image.
    Kernel = 2,
    /// Firmware or otherwise reserved memory.
    Reserved = 3,
    /// Console/framebuffer memory.
    Console = 4,
}

/// A half-open physical range `[start, end)` with a type tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
    pub kind: MemoryType,
}

impl MemoryRange {
    #[must_use]
    pub const fn new(start: u64, end: u64, kind: MemoryType) -> Self {
        Self { start, end, kind }
    }

    #[must_use]
    pub const fn contains(&self, pa: u64) -> bool {
        self.start <= pa && pa < self.end
    }
}

/// Read-only view of the boot-time memory map.
#[derive(Copy, Clone, Debug)]
pub struct PhysicalRanges<'a> {
    ranges: &'a [MemoryRange],
}

impl<'a> PhysicalRanges<'a> {
    #[must_use]
    pub const fn new(ranges: &'a [MemoryRange]) -> Self {
        Self { ranges }
    }

    /// Returns the type of the physical address `pa`.
    ///
    /// Later ranges take precedence over earlier ones, so a reserved hole can
    /// be punched into an available range by listing it afterwards.
    #[must_use]
    pub fn type_of(&self, pa: u64) -> MemoryType {
        self.ranges
            .iter()
            .rev()
            .find(|r| r.contains(pa))
            .map_or(MemoryType::Nonexistent, |r| r.kind)
    }

    /// One past the highest address covered by any range.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.ranges.iter().map(|r| r.end).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a MemoryRange> + 'a {
        self.ranges.iter()
    }
}

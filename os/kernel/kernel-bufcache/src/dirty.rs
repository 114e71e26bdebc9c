//! Entries waiting for write-back.

/// Set of dirty slot indices, including the superblock slot at index `N`.
///
/// Write-back takes the whole set at once with [`take`](Self::take), so
/// entries marked dirty while a sync is in progress land in a fresh set.
pub(crate) struct DirtySet<const N: usize> {
    slots: [bool; N],
    superblock: bool,
}

impl<const N: usize> DirtySet<N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [false; N],
            superblock: false,
        }
    }

    fn flag(&mut self, slot: usize) -> &mut bool {
        if slot == N {
            &mut self.superblock
        } else {
            &mut self.slots[slot]
        }
    }

    /// Adds `slot`; returns whether it was newly added.
    pub(crate) fn insert(&mut self, slot: usize) -> bool {
        !core::mem::replace(self.flag(slot), true)
    }

    /// Removes `slot`; returns whether it was present.
    pub(crate) fn remove(&mut self, slot: usize) -> bool {
        core::mem::replace(self.flag(slot), false)
    }

    pub(crate) fn contains(&self, slot: usize) -> bool {
        if slot == N {
            self.superblock
        } else {
            self.slots[slot]
        }
    }

    pub(crate) fn take(&mut self) -> Self {
        core::mem::replace(self, Self::new())
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.superblock && !self.slots.contains(&true)
    }

    /// Dirty slots in index order, superblock last.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..=N).filter(|&slot| self.contains(slot))
    }
}

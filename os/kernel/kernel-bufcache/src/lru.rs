//! Recency order of the occupied cache slots.

/// Fixed-capacity stack of slot indices, most recently used first.
pub(crate) struct LruStack<const N: usize> {
    slots: [usize; N],
    len: usize,
}

impl<const N: usize> LruStack<N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [0; N],
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    fn position(&self, slot: usize) -> Option<usize> {
        self.slots[..self.len].iter().position(|&s| s == slot)
    }

    /// Moves `slot` to the top, inserting it if absent.
    pub(crate) fn mark_mru(&mut self, slot: usize) {
        let end = match self.position(slot) {
            Some(pos) => pos,
            None => {
                assert!(self.len < N, "LRU stack overflow");
                self.len += 1;
                self.len - 1
            }
        };
        self.slots.copy_within(0..end, 1);
        self.slots[0] = slot;
    }

    pub(crate) fn remove(&mut self, slot: usize) {
        if let Some(pos) = self.position(slot) {
            self.slots.copy_within(pos + 1..self.len, pos);
            self.len -= 1;
        }
    }

    /// Slots from least to most recently used.
    pub(crate) fn iter_lru(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots[..self.len].iter().rev().copied()
    }
}

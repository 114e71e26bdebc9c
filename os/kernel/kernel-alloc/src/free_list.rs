//! # Per-Order Free Lists
//!
//! Free blocks are kept on one doubly-linked list per order. Links are stored
//! out of line, indexed by the block's first page, so a free block's memory is
//! never touched and removing an arbitrary block (as merging requires) is O(1).
//!
//! ```text
//! heads[o] ─► page 8 ⇄ page 40 ⇄ page 96 ◄─ tails[o]
//! ```
//!
//! A page is linked on at most one list at a time.

use kernel_info::memory::{MIN_ORDER, ORDER_COUNT, PHYS_PAGES_COUNT};

#[derive(Copy, Clone, Debug)]
struct Link {
    prev: Option<u32>,
    next: Option<u32>,
    /// Slot of the list this page is on.
    list: Option<u8>,
}

impl Link {
    const UNLINKED: Self = Self {
        prev: None,
        next: None,
        list: None,
    };
}

pub(crate) struct FreeLists {
    heads: [Option<u32>; ORDER_COUNT],
    tails: [Option<u32>; ORDER_COUNT],
    lens: [usize; ORDER_COUNT],
    links: [Link; PHYS_PAGES_COUNT],
}

#[inline]
const fn slot(order: u32) -> usize {
    (order - MIN_ORDER) as usize
}

impl FreeLists {
    pub(crate) const fn new() -> Self {
        Self {
            heads: [None; ORDER_COUNT],
            tails: [None; ORDER_COUNT],
            lens: [0; ORDER_COUNT],
            links: [Link::UNLINKED; PHYS_PAGES_COUNT],
        }
    }

    /// Appends the block starting at page `page` to the `order` list.
    ///
    /// # Panics
    /// Panics if the page is already on a list.
    pub(crate) fn push_back(&mut self, order: u32, page: usize) {
        let s = slot(order);
        assert!(
            self.links[page].list.is_none(),
            "page {page} is already on a free list"
        );
        let idx = page as u32;
        self.links[page] = Link {
            prev: self.tails[s],
            next: None,
            list: Some(s as u8),
        };
        match self.tails[s] {
            Some(tail) => self.links[tail as usize].next = Some(idx),
            None => self.heads[s] = Some(idx),
        }
        self.tails[s] = Some(idx);
        self.lens[s] += 1;
    }

    /// Unlinks and returns the first block on the `order` list.
    pub(crate) fn pop_front(&mut self, order: u32) -> Option<usize> {
        let head = self.heads[slot(order)]? as usize;
        self.erase(order, head);
        Some(head)
    }

    /// Unlinks the block starting at page `page` from the `order` list.
    ///
    /// # Panics
    /// Panics if the page is not on that list.
    pub(crate) fn erase(&mut self, order: u32, page: usize) {
        let s = slot(order);
        let link = self.links[page];
        assert_eq!(
            link.list,
            Some(s as u8),
            "page {page} is not on the order-{order} free list"
        );
        match link.prev {
            Some(p) => self.links[p as usize].next = link.next,
            None => self.heads[s] = link.next,
        }
        match link.next {
            Some(n) => self.links[n as usize].prev = link.prev,
            None => self.tails[s] = link.prev,
        }
        self.links[page] = Link::UNLINKED;
        self.lens[s] -= 1;
    }

    /// Order of the list `page` is linked on, if any.
    pub(crate) fn linked_order(&self, page: usize) -> Option<u32> {
        self.links[page].list.map(|s| u32::from(s) + MIN_ORDER)
    }

    pub(crate) const fn len(&self, order: u32) -> usize {
        self.lens[slot(order)]
    }

    /// First pages of the blocks on the `order` list, front to back.
    pub(crate) fn iter(&self, order: u32) -> impl Iterator<Item = usize> + '_ {
        let mut cursor = self.heads[slot(order)];
        core::iter::from_fn(move || {
            let page = cursor? as usize;
            cursor = self.links[page].next;
            Some(page)
        })
    }
}

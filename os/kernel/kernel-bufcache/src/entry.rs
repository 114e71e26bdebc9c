//! # Buffer Cache Entries
//!
//! ```text
//!            claim            load starts       read done
//!   Empty ──────────► Allocated ──────► Loading ──────────► Clean
//!     ▲                   ▲               │                 │  ▲
//!     │                   └── read failed ┘      mark_dirty │  │ written back
//!     │                                                     ▼  │
//!     └──────────── evict / drop (refs == 0) ◄─────────── Dirty┘ (never evicted)
//! ```

use core::ptr::NonNull;
use kernel_info::fs::BLOCK_SIZE;
use kernel_sync::{ExchangeLock, SpinLock};

/// Disk block number.
pub type BlockNum = u32;

/// Lifecycle of a cache slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum EntryState {
    Empty,
    /// Bound to a block number; contents not yet read.
    Allocated,
    /// A disk read into the buffer is in flight.
    Loading,
    Clean,
    /// Modified in memory and queued for write-back.
    Dirty,
}

impl EntryState {
    /// Whether the buffer holds the block's contents.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Clean | Self::Dirty)
    }
}

pub(crate) struct EntryMeta {
    pub(crate) state: EntryState,
    pub(crate) bn: BlockNum,
    pub(crate) refs: u32,
    pub(crate) buf: Option<NonNull<u8>>,
}

// Safety: the buffer is a page owned by the entry; access is coordinated by
// the entry state and the write token.
unsafe impl Send for EntryMeta {}

impl EntryMeta {
    const fn new() -> Self {
        Self {
            state: EntryState::Empty,
            bn: 0,
            refs: 0,
            buf: None,
        }
    }

    /// Resets to `Empty` and hands back the buffer for freeing.
    pub(crate) fn clear(&mut self) -> Option<NonNull<u8>> {
        assert_eq!(self.refs, 0, "clearing a referenced entry");
        self.state = EntryState::Empty;
        self.buf.take()
    }
}

/// One slot of the buffer cache.
pub struct BcEntry {
    index: usize,
    pub(crate) meta: SpinLock<EntryMeta>,
    pub(crate) write: ExchangeLock,
}

impl BcEntry {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            meta: SpinLock::new(EntryMeta::new()),
            write: ExchangeLock::new(),
        }
    }

    /// Position of this entry in the cache. The superblock slot comes after
    /// all regular slots.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn state(&self) -> EntryState {
        self.meta.lock().state
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state() == EntryState::Empty
    }

    /// Block number, if the slot is bound to one.
    #[must_use]
    pub fn block_number(&self) -> Option<BlockNum> {
        let meta = self.meta.lock();
        (meta.state != EntryState::Empty).then_some(meta.bn)
    }

    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.meta.lock().refs
    }

    /// Whether `ptr` points into this entry's loaded buffer.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let meta = self.meta.lock();
        match meta.buf {
            Some(buf) if meta.state.is_loaded() => {
                (ptr as usize).wrapping_sub(buf.as_ptr() as usize) < BLOCK_SIZE
            }
            _ => false,
        }
    }

    /// Whether some task holds the write token.
    #[must_use]
    pub fn is_write_held(&self) -> bool {
        self.write.is_held()
    }
}

impl core::fmt::Debug for BcEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let meta = self.meta.lock();
        f.debug_struct("BcEntry")
            .field("index", &self.index)
            .field("state", &meta.state)
            .field("bn", &meta.bn)
            .field("refs", &meta.refs)
            .field("write", &self.write.is_held())
            .finish()
    }
}

//! # Buffer Cache
//!
//! [`BufCache`] keeps up to `N` disk blocks in memory, one allocator page per
//! block, plus a reserved slot for the superblock (block 0).
//!
//! ## Locking
//! - The cache lock guards the LRU stack and every slot's binding to a block
//!   number. It is taken before any entry lock.
//! - Each entry's metadata lock guards its state, reference count and buffer.
//! - The dirty set has its own lock, taken after an entry lock.
//!
//! No spin lock is held while blocking on disk I/O or on a wait queue.
//!
//! ## Blocking points
//! - **Eviction wait**: every slot is referenced, or the only idle dirty slot
//!   is already being written back; woken by [`BlockRef`] drops, by
//!   write-back and by a failed sync.
//! - **Load wait**: another task is reading the same block; woken when the
//!   read completes.
//! - **Write token**: another task holds the entry's [`BlockWriteGuard`].

use crate::dirty::DirtySet;
use crate::disk::BlockDevice;
use crate::entry::{BcEntry, BlockNum, EntryState};
use crate::error::BufCacheError;
use crate::lru::LruStack;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::slice;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_alloc::PageSource;
use kernel_info::fs::{BLOCK_SIZE, BUFCACHE_ENTRIES};
use kernel_sync::{SpinLock, WaitQueue};
use log::{debug, trace, warn};

/// Called once on a freshly read block, with the slot index and the buffer,
/// before any other task can see the contents.
pub type Cleaner = fn(usize, &mut [u8]);

enum Eviction {
    Slot(usize),
    /// Only dirty slots are unreferenced; this is the least recently used.
    Dirty(usize),
    AllReferenced,
}

#[inline]
const fn block_offset(bn: BlockNum) -> u64 {
    bn as u64 * BLOCK_SIZE as u64
}

/// Copies a cached block into `dst` one aligned word at a time.
///
/// Words of a cached block may change through atomics without the write
/// token (inode lock words), so the source is never read as plain bytes.
#[allow(clippy::cast_ptr_alignment)]
fn snapshot(src: NonNull<u8>, dst: NonNull<u8>) {
    let src = src.as_ptr().cast::<u32>();
    let dst = dst.as_ptr().cast::<u32>();
    for i in 0..BLOCK_SIZE / 4 {
        // SAFETY: both buffers are distinct page-aligned BLOCK_SIZE
        // allocations, and `dst` is owned by the caller.
        unsafe {
            let word = AtomicU32::from_ptr(src.add(i)).load(Ordering::Relaxed);
            dst.add(i).write(word);
        }
    }
}

/// A fixed-size write-back cache of disk blocks.
pub struct BufCache<D, P, const N: usize = BUFCACHE_ENTRIES> {
    lru: SpinLock<LruStack<N>>,
    entries: [BcEntry; N],
    superblock: BcEntry,
    dirty: SpinLock<DirtySet<N>>,
    read_wq: WaitQueue,
    evict_wq: WaitQueue,
    write_wq: WaitQueue,
    disk: D,
    pages: P,
}

impl<D: BlockDevice, P: PageSource, const N: usize> BufCache<D, P, N> {
    /// An empty cache reading from `disk` and backing blocks with `pages`.
    pub fn new(disk: D, pages: P) -> Self {
        Self {
            lru: SpinLock::new(LruStack::new()),
            entries: core::array::from_fn(BcEntry::new),
            superblock: BcEntry::new(N),
            dirty: SpinLock::new(DirtySet::new()),
            read_wq: WaitQueue::new(),
            evict_wq: WaitQueue::new(),
            write_wq: WaitQueue::new(),
            disk,
            pages,
        }
    }

    /// Number of regular slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn disk(&self) -> &D {
        &self.disk
    }

    /// Slot `index`; index `N` is the superblock slot.
    ///
    /// # Panics
    /// Panics if `index > N`.
    #[must_use]
    pub fn entry(&self, index: usize) -> &BcEntry {
        if index == N {
            &self.superblock
        } else {
            &self.entries[index]
        }
    }

    /// The slot currently bound to `bn`, without taking a reference.
    #[must_use]
    pub fn lookup(&self, bn: BlockNum) -> Option<&BcEntry> {
        if bn == 0 {
            return (!self.superblock.is_empty()).then_some(&self.superblock);
        }
        let _lru = self.lru.lock();
        self.entries
            .iter()
            .find(|e| e.block_number() == Some(bn))
    }

    /// Number of regular slots bound to a block.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.lru.lock().len()
    }

    /// Number of slots waiting for write-back.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().iter().count()
    }

    /// Returns a reference to block `bn`, reading it from disk if necessary.
    ///
    /// If the block is read, `cleaner` runs on it before anyone else sees it.
    /// Concurrent requests for the same block share a single disk read.
    ///
    /// Blocks while every slot is referenced. If the only unreferenced slots
    /// are dirty, the least recently used one is written back first.
    ///
    /// # Errors
    /// - [`BufCacheError::OutOfMemory`] if no page is available for the block
    /// - [`BufCacheError::Io`] if the read fails
    /// - [`BufCacheError::Exhausted`] if dirty slots could not be written back
    ///   to make room
    pub fn get_disk_entry(
        &self,
        bn: BlockNum,
        cleaner: Option<Cleaner>,
    ) -> Result<BlockRef<'_, D, P, N>, BufCacheError> {
        let entry = if bn == 0 {
            self.claim_superblock()
        } else {
            self.claim(bn)?
        };
        let buf = self.load(entry, cleaner)?;
        Ok(BlockRef {
            cache: self,
            entry,
            buf,
            bn,
        })
    }

    /// Writes every dirty block to disk.
    ///
    /// With `drop > 0`, every unreferenced clean slot is then emptied and its
    /// page freed. With `drop > 1`, a referenced regular slot is a fatal
    /// error; use this only when the caller knows the cache is quiescent.
    ///
    /// The caller must not hold a write token.
    ///
    /// # Errors
    /// [`BufCacheError::Io`] on the first failed write, or
    /// [`BufCacheError::OutOfMemory`] if no bounce page is available. Blocks
    /// not yet written stay dirty.
    ///
    /// # Panics
    /// With `drop > 1`, panics if a block past block 1 is still referenced.
    pub fn sync(&self, drop: u32) -> Result<(), BufCacheError> {
        let batch = self.dirty.with_lock(DirtySet::take);
        let mut pending = batch.iter();
        let mut written = 0usize;

        while let Some(slot) = pending.next() {
            if let Err(e) = self.write_back(self.entry(slot)) {
                self.dirty.with_lock(|dirty| {
                    dirty.insert(slot);
                    for rest in pending.by_ref() {
                        dirty.insert(rest);
                    }
                });
                self.evict_wq.wake_all();
                warn!("bufcache: write-back of slot {slot} failed: {e}");
                return Err(e);
            }
            written += 1;
        }

        if drop > 0 {
            self.drop_unreferenced(drop > 1);
        }
        debug!("bufcache: synced {written} blocks");
        Ok(())
    }

    fn claim_superblock(&self) -> &BcEntry {
        let mut meta = self.superblock.meta.lock();
        if meta.state == EntryState::Empty {
            meta.state = EntryState::Allocated;
            meta.bn = 0;
        }
        meta.refs += 1;
        &self.superblock
    }

    /// Binds a slot to `bn` (or finds the one already bound) and takes a
    /// reference on it.
    fn claim(&self, bn: BlockNum) -> Result<&BcEntry, BufCacheError> {
        loop {
            // Armed before looking, so a `put` racing with the scan is seen.
            let waiter = self.evict_wq.prepare();
            let mut lru = self.lru.lock();

            let mut empty = None;
            let mut found = None;
            for entry in &self.entries {
                let meta = entry.meta.lock();
                if meta.state == EntryState::Empty {
                    empty = empty.or(Some(entry.index()));
                } else if meta.bn == bn {
                    found = Some(entry.index());
                    break;
                }
            }

            let slot = match (found, empty) {
                (Some(slot), _) => {
                    trace!("bufcache: block {bn} hit in slot {slot}");
                    slot
                }
                (None, Some(slot)) => slot,
                (None, None) => match self.evict_lru(&mut lru) {
                    Eviction::Slot(slot) => slot,
                    Eviction::Dirty(slot) => {
                        drop(lru);
                        debug!("bufcache: all idle slots are dirty; writing back slot {slot}");
                        match self.write_back_idle(&self.entries[slot]) {
                            Ok(true) => {}
                            Ok(false) => waiter.block(),
                            Err(BufCacheError::Io(e)) => {
                                warn!("bufcache: cannot make room for block {bn}: {e}");
                                return Err(BufCacheError::Exhausted);
                            }
                            Err(e) => return Err(e),
                        }
                        continue;
                    }
                    Eviction::AllReferenced => {
                        drop(lru);
                        debug!("bufcache: every slot is referenced; waiting");
                        waiter.block();
                        continue;
                    }
                },
            };

            let entry = &self.entries[slot];
            {
                let mut meta = entry.meta.lock();
                if meta.state == EntryState::Empty {
                    meta.state = EntryState::Allocated;
                    meta.bn = bn;
                    debug!("bufcache: block {bn} miss, using slot {slot}");
                }
                meta.refs += 1;
            }
            lru.mark_mru(slot);
            return Ok(entry);
        }
    }

    /// Empties the least recently used slot that is neither referenced nor
    /// dirty.
    fn evict_lru(&self, lru: &mut LruStack<N>) -> Eviction {
        let mut dirty = None;
        let victim = lru.iter_lru().find(|&slot| {
            let meta = self.entries[slot].meta.lock();
            if meta.refs != 0 {
                return false;
            }
            if meta.state == EntryState::Dirty {
                dirty = dirty.or(Some(slot));
                return false;
            }
            true
        });

        let Some(slot) = victim else {
            return dirty.map_or(Eviction::AllReferenced, Eviction::Dirty);
        };

        let (bn, buf) = {
            let mut meta = self.entries[slot].meta.lock();
            (meta.bn, meta.clear())
        };
        lru.remove(slot);
        if let Some(buf) = buf {
            self.pages.free_page(buf);
        }
        debug!("bufcache: evicted block {bn} from slot {slot}");
        Eviction::Slot(slot)
    }

    /// Makes sure the referenced `entry` holds its block's contents.
    fn load(
        &self,
        entry: &BcEntry,
        cleaner: Option<Cleaner>,
    ) -> Result<NonNull<u8>, BufCacheError> {
        let mut meta = entry.meta.lock();
        loop {
            match meta.state {
                EntryState::Clean | EntryState::Dirty => {
                    let Some(buf) = meta.buf else {
                        panic!("loaded slot {} has no buffer", entry.index());
                    };
                    return Ok(buf);
                }
                EntryState::Loading => {
                    meta = self
                        .read_wq
                        .block_until(meta, |m| m.state != EntryState::Loading);
                }
                EntryState::Allocated => break,
                EntryState::Empty => panic!("referenced slot {} is empty", entry.index()),
            }
        }

        let buf = match meta.buf {
            Some(buf) => buf,
            None => match self.pages.alloc_page() {
                Ok(buf) => *meta.buf.insert(buf),
                Err(e) => {
                    drop(meta);
                    self.put(entry);
                    return Err(e.into());
                }
            },
        };
        meta.state = EntryState::Loading;
        let bn = meta.bn;
        drop(meta);

        // SAFETY: while the slot is `Loading` no other task touches the buffer.
        let data = unsafe { slice::from_raw_parts_mut(buf.as_ptr(), BLOCK_SIZE) };
        let result = self.disk.read(data, block_offset(bn));
        if result.is_ok()
            && let Some(clean) = cleaner
        {
            clean(entry.index(), data);
        }

        entry.meta.lock().state = if result.is_ok() {
            EntryState::Clean
        } else {
            EntryState::Allocated
        };
        self.read_wq.wake_all();

        if let Err(e) = result {
            warn!("bufcache: reading block {bn} failed: {e}");
            self.put(entry);
            return Err(e.into());
        }
        debug!("bufcache: loaded block {bn} into slot {}", entry.index());
        Ok(buf)
    }

    /// Drops a reference. Waiters are woken for dirty slots too: an eviction
    /// waiter that finds only dirty idle slots writes them back itself.
    fn put(&self, entry: &BcEntry) {
        let idle = {
            let mut meta = entry.meta.lock();
            assert!(meta.refs > 0, "put on unreferenced slot {}", entry.index());
            meta.refs -= 1;
            meta.refs == 0
        };
        if idle {
            self.evict_wq.wake_all();
        }
    }

    fn mark_dirty(&self, entry: &BcEntry) {
        assert!(
            entry.write.is_held(),
            "mark_dirty on slot {} without the write token",
            entry.index()
        );
        let mut meta = entry.meta.lock();
        if meta.state == EntryState::Clean {
            meta.state = EntryState::Dirty;
            self.dirty.with_lock(|dirty| dirty.insert(entry.index()));
            trace!("bufcache: block {} dirty", meta.bn);
        }
    }

    fn write_back(&self, entry: &BcEntry) -> Result<(), BufCacheError> {
        entry.write.acquire(&self.write_wq);
        let result = self.flush(entry);
        entry.write.release(&self.write_wq);
        result
    }

    /// Writes back one idle dirty slot to make room for a new block.
    ///
    /// Returns `Ok(false)` without writing if the slot is already part of a
    /// running sync or someone holds its write token; the caller should wait
    /// for an eviction wake-up.
    fn write_back_idle(&self, entry: &BcEntry) -> Result<bool, BufCacheError> {
        let slot = entry.index();
        if !self.dirty.with_lock(|dirty| dirty.remove(slot)) {
            return Ok(false);
        }
        if !entry.write.try_acquire() {
            self.dirty.with_lock(|dirty| dirty.insert(slot));
            return Ok(false);
        }

        let result = self.flush(entry);
        entry.write.release(&self.write_wq);
        if result.is_err() {
            self.dirty.with_lock(|dirty| dirty.insert(slot));
        }
        result.map(|()| true)
    }

    /// Writes a dirty slot to disk and marks it clean. The caller holds the
    /// write token.
    fn flush(&self, entry: &BcEntry) -> Result<(), BufCacheError> {
        let (bn, buf) = {
            let meta = entry.meta.lock();
            (meta.bn, meta.buf)
        };
        let Some(buf) = buf else {
            panic!("dirty slot {} has no buffer", entry.index());
        };

        let bounce = self.pages.alloc_page()?;
        snapshot(buf, bounce);
        // SAFETY: the bounce page is a fresh BLOCK_SIZE allocation owned here.
        let data = unsafe { slice::from_raw_parts(bounce.as_ptr(), BLOCK_SIZE) };
        let result = self.disk.write(data, block_offset(bn));
        self.pages.free_page(bounce);
        result?;

        let idle = {
            let mut meta = entry.meta.lock();
            meta.state = EntryState::Clean;
            meta.refs == 0
        };
        if idle {
            self.evict_wq.wake_all();
        }
        Ok(())
    }

    fn drop_unreferenced(&self, strict: bool) {
        let mut lru = self.lru.lock();
        let mut dropped = 0usize;
        for entry in &self.entries {
            let mut meta = entry.meta.lock();
            match (meta.state, meta.refs) {
                (EntryState::Empty | EntryState::Dirty, _) => {}
                (_, 0) => {
                    let buf = meta.clear();
                    drop(meta);
                    lru.remove(entry.index());
                    if let Some(buf) = buf {
                        self.pages.free_page(buf);
                    }
                    dropped += 1;
                }
                (_, refs) => assert!(
                    !strict || meta.bn < 2,
                    "block {} is still referenced ({refs} refs)",
                    meta.bn
                ),
            }
        }
        debug!("bufcache: dropped {dropped} idle blocks");
    }
}

impl<D, P, const N: usize> core::fmt::Debug for BufCache<D, P, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufCache")
            .field("capacity", &N)
            .field("occupied", &self.lru.lock().len())
            .finish_non_exhaustive()
    }
}

/// A counted reference to a cached block.
///
/// The slot is not evicted while any reference exists. Dropping the
/// reference releases it.
#[must_use]
pub struct BlockRef<'c, D: BlockDevice, P: PageSource, const N: usize> {
    cache: &'c BufCache<D, P, N>,
    entry: &'c BcEntry,
    buf: NonNull<u8>,
    bn: BlockNum,
}

impl<'c, D: BlockDevice, P: PageSource, const N: usize> BlockRef<'c, D, P, N> {
    #[must_use]
    pub const fn entry(&self) -> &'c BcEntry {
        self.entry
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.entry.index()
    }

    #[must_use]
    pub const fn block_number(&self) -> BlockNum {
        self.bn
    }

    #[must_use]
    pub const fn cache(&self) -> &'c BufCache<D, P, N> {
        self.cache
    }

    /// The block's buffer. Valid for [`BLOCK_SIZE`] bytes while `self` lives.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.buf.as_ptr()
    }

    /// The block's contents.
    ///
    /// # Safety
    /// No task may write the block (through a [`BlockWriteGuard`]) while the
    /// returned slice is alive. Callers typically guarantee this with a
    /// higher-level lock such as an inode lock.
    #[must_use]
    pub const unsafe fn data(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.buf.as_ptr(), BLOCK_SIZE) }
    }

    /// Runs `f` on the block contents while holding the write token, so no
    /// writer can interfere.
    ///
    /// Inode blocks are the exception: their lock words change through
    /// atomics without the token, so read those through [`Inode`] instead.
    ///
    /// [`Inode`]: crate::Inode
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.get_write();
        f(&guard)
    }

    /// Obtains the entry's write token, blocking while another task holds it.
    pub fn get_write(&self) -> BlockWriteGuard<'_, 'c, D, P, N> {
        self.entry.write.acquire(&self.cache.write_wq);
        BlockWriteGuard {
            block: self,
            dirty: false,
        }
    }

    /// Obtains the write token if nobody holds it.
    pub fn try_get_write(&self) -> Option<BlockWriteGuard<'_, 'c, D, P, N>> {
        self.entry.write.try_acquire().then_some(BlockWriteGuard {
            block: self,
            dirty: false,
        })
    }

    /// Releases the reference. Same as dropping it.
    pub fn put(self) {}
}

impl<D: BlockDevice, P: PageSource, const N: usize> Clone for BlockRef<'_, D, P, N> {
    fn clone(&self) -> Self {
        self.entry.meta.lock().refs += 1;
        Self {
            cache: self.cache,
            entry: self.entry,
            buf: self.buf,
            bn: self.bn,
        }
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> Drop for BlockRef<'_, D, P, N> {
    fn drop(&mut self) {
        self.cache.put(self.entry);
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> core::fmt::Debug for BlockRef<'_, D, P, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockRef")
            .field("bn", &self.bn)
            .field("slot", &self.entry.index())
            .finish()
    }
}

/// Exclusive write access to a cached block.
///
/// Dropping the guard releases the write token. The block is queued for
/// write-back only if [`mark_dirty`](Self::mark_dirty) was called or the
/// guard is released with [`put_write(true)`](Self::put_write).
#[must_use]
pub struct BlockWriteGuard<'r, 'c, D: BlockDevice, P: PageSource, const N: usize> {
    block: &'r BlockRef<'c, D, P, N>,
    dirty: bool,
}

impl<D: BlockDevice, P: PageSource, const N: usize> BlockWriteGuard<'_, '_, D, P, N> {
    /// Queues the block for write-back when the guard is released.
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Releases the write token, queueing the block for write-back if
    /// `mark_dirty` is set.
    pub fn put_write(mut self, mark_dirty: bool) {
        self.dirty |= mark_dirty;
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> Deref for BlockWriteGuard<'_, '_, D, P, N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the write token excludes every other writer.
        unsafe { slice::from_raw_parts(self.block.buf.as_ptr(), BLOCK_SIZE) }
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> DerefMut for BlockWriteGuard<'_, '_, D, P, N> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: the write token excludes every other writer.
        unsafe { slice::from_raw_parts_mut(self.block.buf.as_ptr(), BLOCK_SIZE) }
    }
}

impl<D: BlockDevice, P: PageSource, const N: usize> Drop for BlockWriteGuard<'_, '_, D, P, N> {
    fn drop(&mut self) {
        let cache = self.block.cache;
        if self.dirty {
            cache.mark_dirty(self.block.entry);
        }
        self.block.entry.write.release(&cache.write_wq);
    }
}

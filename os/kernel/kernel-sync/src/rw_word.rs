use crate::yield_hook::yield_now;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// Lock word value meaning "exclusively locked for writing".
pub const WRITE_LOCKED: u32 = u32::MAX;

/// Highest reader count that may still be incremented.
const MAX_READERS: u32 = WRITE_LOCKED - 2;

/// A reader/writer lock in a single 32-bit word.
///
/// * `0`: unlocked
/// * [`WRITE_LOCKED`]: held by one writer
/// * anything else: number of readers
///
/// Waiting yields the processor between attempts, so this is meant for short
/// critical sections only. Because the encoding is part of the contract (it is
/// stored in on-disk structures and checked by assertions), a word living in
/// foreign memory can be reinterpreted with [`RwWord::from_atomic`].
#[repr(transparent)]
pub struct RwWord(AtomicU32);

impl Default for RwWord {
    fn default() -> Self {
        Self::new()
    }
}

impl RwWord {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Views an existing atomic word as a lock.
    #[must_use]
    pub const fn from_atomic(word: &AtomicU32) -> &Self {
        // SAFETY: `RwWord` is `repr(transparent)` over `AtomicU32`.
        unsafe { &*core::ptr::from_ref(word).cast::<Self>() }
    }

    /// Current raw lock value.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Takes a read lock unless a writer holds the lock or the reader count
    /// would overflow.
    pub fn try_lock_read(&self) -> bool {
        let mut v = self.0.load(Ordering::Relaxed);
        while v <= MAX_READERS {
            match self
                .0
                .compare_exchange_weak(v, v + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(current) => v = current,
            }
        }
        false
    }

    /// Blocks until a read lock is obtained.
    pub fn lock_read(&self) {
        let mut v = self.0.load(Ordering::Relaxed);
        loop {
            if v > MAX_READERS {
                yield_now();
                v = self.0.load(Ordering::Relaxed);
            } else {
                match self
                    .0
                    .compare_exchange_weak(v, v + 1, Ordering::Acquire, Ordering::Relaxed)
                {
                    Ok(_) => return,
                    Err(current) => {
                        v = current;
                        spin_loop();
                    }
                }
            }
        }
    }

    /// Drops one read lock.
    ///
    /// # Panics
    /// Panics if the word is unlocked or write-locked.
    pub fn unlock_read(&self) {
        let mut v = self.0.load(Ordering::Relaxed);
        loop {
            assert!(
                v != 0 && v != WRITE_LOCKED,
                "unlock_read without a read lock (word = {v:#x})"
            );
            match self
                .0
                .compare_exchange_weak(v, v - 1, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    v = current;
                    spin_loop();
                }
            }
        }
    }

    /// Takes the write lock if nobody holds the lock at all.
    #[inline]
    pub fn try_lock_write(&self) -> bool {
        self.0
            .compare_exchange(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Blocks until no reader or writer is present, then takes the write lock.
    pub fn lock_write(&self) {
        while self
            .0
            .compare_exchange_weak(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            yield_now();
        }
    }

    /// Releases the write lock.
    ///
    /// # Panics
    /// Panics if the word is not write-locked.
    pub fn unlock_write(&self) {
        assert!(self.has_write_lock(), "unlock_write without the write lock");
        self.0.store(0, Ordering::Release);
    }

    #[inline]
    pub fn has_write_lock(&self) -> bool {
        self.0.load(Ordering::Relaxed) == WRITE_LOCKED
    }
}

use crate::spin_lock::{SpinLock, SpinLockGuard};
use crate::yield_hook::yield_now;
use core::sync::atomic::{AtomicU64, Ordering};

/// A queue of tasks waiting for some condition to change.
///
/// The queue is a generation counter: [`wake_all`](Self::wake_all) bumps it,
/// and a [`Waiter`] remembers the generation it observed in
/// [`prepare`](Self::prepare). A waiter whose generation is stale has been
/// woken.
///
/// The protocol that avoids lost wake-ups is the classic one:
///
/// 1. `prepare()` while the protected state is still locked,
/// 2. check the condition,
/// 3. release the lock,
/// 4. [`Waiter::block`].
///
/// Wakers change the state first and call `wake_all()` afterwards. A wake that
/// lands between steps 3 and 4 has already advanced the generation past the
/// one captured in step 1, so `block` returns immediately.
pub struct WaitQueue {
    generation: AtomicU64,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait intent installed on a [`WaitQueue`].
#[must_use = "a waiter does nothing unless `block` is called"]
pub struct Waiter<'a> {
    queue: &'a WaitQueue,
    ticket: u64,
}

impl WaitQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
        }
    }

    /// Records the intent to wait. Call this *before* checking the condition.
    #[inline]
    pub fn prepare(&self) -> Waiter<'_> {
        Waiter {
            queue: self,
            ticket: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Wakes every task currently waiting on this queue.
    #[inline]
    pub fn wake_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Blocks until `predicate()` returns `true`.
    ///
    /// The predicate is re-evaluated after every wake-up and must itself be
    /// race-free (e.g. an atomic exchange).
    pub fn wait_until(&self, mut predicate: impl FnMut() -> bool) {
        loop {
            let waiter = self.prepare();
            if predicate() {
                return;
            }
            waiter.block();
        }
    }

    /// Blocks until `predicate` returns `true` for the state behind `guard`.
    ///
    /// The predicate always runs with the lock held. The lock is released while
    /// blocking and is held again when this returns.
    pub fn block_until<'a, T>(
        &self,
        mut guard: SpinLockGuard<'a, T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> SpinLockGuard<'a, T> {
        loop {
            let waiter = self.prepare();
            if predicate(&mut guard) {
                return guard;
            }
            let lock: &'a SpinLock<T> = SpinLockGuard::spin_lock(&guard);
            drop(guard);
            waiter.block();
            guard = lock.lock();
        }
    }
}

impl Waiter<'_> {
    /// Whether the queue has been woken since this waiter was prepared.
    #[inline]
    #[must_use]
    pub fn is_woken(&self) -> bool {
        self.queue.generation.load(Ordering::SeqCst) != self.ticket
    }

    /// Gives up the processor until the queue is woken.
    pub fn block(self) {
        while !self.is_woken() {
            yield_now();
        }
    }
}

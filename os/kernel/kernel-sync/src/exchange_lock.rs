use crate::wait_queue::WaitQueue;
use core::sync::atomic::{AtomicBool, Ordering};

/// A binary token taken by atomic exchange.
///
/// On its own this is a try-lock. [`acquire`](Self::acquire) turns it into a
/// blocking lock by parking on a caller-supplied [`WaitQueue`]; several locks
/// may share one queue.
pub struct ExchangeLock {
    /// * `false`: free
    /// * `true`: held
    held: AtomicBool,
}

impl Default for ExchangeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeLock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Try once; returns whether the token was obtained.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Blocks on `queue` until the token is obtained.
    pub fn acquire(&self, queue: &WaitQueue) {
        queue.wait_until(|| self.try_acquire());
    }

    /// Returns the token and wakes everyone parked on `queue`.
    ///
    /// # Panics
    /// Panics if the token is not held.
    pub fn release(&self, queue: &WaitQueue) {
        let was_held = self.held.swap(false, Ordering::Release);
        assert!(was_held, "exchange lock released while not held");
        queue.wake_all();
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

//! # Kernel synchronization primitives
//!
//! Everything here is built directly on atomics so that it works before (and
//! underneath) the scheduler:
//!
//! * [`SpinLock`] protects short metadata critical sections. Its guard also
//!   holds an [`IrqGuard`], so interrupts are off while the lock is held.
//! * [`WaitQueue`] lets a task sleep until some condition changes. Wait intent
//!   is recorded *before* the caller releases its lock, so a wake-up that races
//!   with going to sleep is never lost.
//! * [`ExchangeLock`] is a binary token acquired by atomic exchange; combined
//!   with a [`WaitQueue`] it becomes a blocking lock.
//! * [`RwWord`] is a reader/writer lock packed into one 32-bit word.
//!
//! Blocking primitives give up the processor through [`yield_now`], which
//! calls the hook installed with [`set_yield_hook`] (the scheduler's yield in
//! the kernel, `std::thread::yield_now` in hosted tests).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod exchange_lock;
pub mod irq;
mod rw_word;
mod spin_lock;
mod wait_queue;
mod yield_hook;

pub use exchange_lock::ExchangeLock;
pub use irq::IrqGuard;
pub use rw_word::{RwWord, WRITE_LOCKED};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use wait_queue::{WaitQueue, Waiter};
pub use yield_hook::{set_yield_hook, yield_now};

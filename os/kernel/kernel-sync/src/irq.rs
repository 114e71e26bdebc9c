//! Interrupt masking for spin lock critical sections.
//!
//! A CPU that holds a spin lock must not take an interrupt whose handler
//! tries to acquire the same lock. [`IrqGuard`] saves the interrupt flag,
//! disables interrupts and restores the saved state on drop; every
//! [`SpinLockGuard`](crate::SpinLockGuard) carries one.
//!
//! # Platform
//!
//! On bare-metal `x86_64` (`target_os = "none"`) this uses `cli`/`sti` and
//! `pushfq; pop`. On hosted targets, where user code cannot touch the
//! interrupt flag, the guard is a no-op and interrupts always read as
//! disabled.

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    /// Disables hardware interrupts (`cli`).
    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables hardware interrupts (`sti`).
    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    /// Returns whether `IF` (bit 9 of `RFLAGS`) is set.
    #[inline]
    pub fn enabled() -> bool {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        (r & (1 << 9)) != 0
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    #[inline]
    pub const fn disable() {}

    #[inline]
    pub const fn enable() {}

    #[inline]
    pub const fn enabled() -> bool {
        false
    }
}

/// Returns whether interrupts are currently enabled on this CPU.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::enabled()
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Interrupts are re-enabled **only** if they were enabled when the guard was
/// created, so guards nest correctly.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = arch::enabled();
        if enabled {
            arch::disable();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable();
        }
    }
}

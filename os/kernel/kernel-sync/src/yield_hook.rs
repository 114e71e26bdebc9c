use core::hint::spin_loop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Installed scheduler yield, or null while none is installed.
static YIELD_HOOK: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Installs the function [`yield_now`] calls to give up the processor.
///
/// The kernel installs its scheduler's yield once during early init;
/// hosted tests install `std::thread::yield_now`.
pub fn set_yield_hook(hook: fn()) {
    YIELD_HOOK.store(hook as *mut (), Ordering::Release);
}

/// Gives up the processor, or spins once if no hook is installed yet.
#[inline]
pub fn yield_now() {
    let raw = YIELD_HOOK.load(Ordering::Acquire);
    if raw.is_null() {
        spin_loop();
    } else {
        // SAFETY: only `set_yield_hook` stores into the hook, and it stores a `fn()`.
        let hook = unsafe { core::mem::transmute::<*mut (), fn()>(raw) };
        hook();
    }
}

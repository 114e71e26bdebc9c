//! # Error Numbers
//!
//! Negative codes returned to user space when an allocation or disk
//! operation fails inside a system call.

/// I/O error.
pub const EIO: i32 = -5;

/// Out of memory.
pub const ENOMEM: i32 = -12;

/// Invalid argument.
pub const EINVAL: i32 = -22;

/// No space left on device.
pub const ENOSPC: i32 = -28;

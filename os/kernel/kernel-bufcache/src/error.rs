use crate::disk::DiskError;
use kernel_alloc::AllocError;
use kernel_info::errno::{EINVAL, EIO, ENOMEM, ENOSPC};

/// Errors reported by the buffer cache and the filesystem layer above it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufCacheError {
    #[error("no memory for a block buffer: {0}")]
    OutOfMemory(#[from] AllocError),

    #[error("disk I/O failed: {0}")]
    Io(#[from] DiskError),

    /// Every slot is referenced or dirty and dirty slots could not be written
    /// back.
    #[error("buffer cache exhausted")]
    Exhausted,

    #[error("superblock is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("no free extent of {0} blocks")]
    NoSpace(u32),
}

impl BufCacheError {
    /// Error number reported across the system call boundary.
    #[must_use]
    pub const fn as_errno(self) -> i32 {
        match self {
            Self::OutOfMemory(_) => ENOMEM,
            Self::Io(_) | Self::Exhausted => EIO,
            Self::Corrupt(_) => EINVAL,
            Self::NoSpace(_) => ENOSPC,
        }
    }
}

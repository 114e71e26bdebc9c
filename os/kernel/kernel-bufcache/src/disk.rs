//! # Block Device Interface
//!
//! The buffer cache talks to the disk driver through [`BlockDevice`]. Calls
//! are blocking from the caller's point of view and always transfer whole
//! blocks at block-aligned byte offsets.

/// Failure reported by a [`BlockDevice`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiskError {
    #[error("no disk attached")]
    NoDevice,

    #[error("offset {0:#x} is beyond the end of the device")]
    OutOfRange(u64),

    #[error("device reported error status {0:#x}")]
    Device(u32),
}

/// A disk addressed in bytes.
pub trait BlockDevice {
    /// Fills `buf` from the device starting at byte `offset`.
    ///
    /// # Errors
    /// Any [`DiskError`] the driver reports.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<(), DiskError>;

    /// Writes `buf` to the device starting at byte `offset`.
    ///
    /// # Errors
    /// Any [`DiskError`] the driver reports.
    fn write(&self, buf: &[u8], offset: u64) -> Result<(), DiskError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<(), DiskError> {
        (**self).read(buf, offset)
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<(), DiskError> {
        (**self).write(buf, offset)
    }
}

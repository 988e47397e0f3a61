//! Data-transfer capability.
//!
//! Raw byte access to a volume, for object-store style consumers that talk
//! to the driver rather than to a mounted filesystem.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::VolumeId;

/// Data-transfer service — read, write, and flush volume contents.
///
/// The byte count of a transfer is the length of the supplied buffer.
/// Offsets are in bytes; a negative offset is rejected with
/// [`VolumeError::InvalidArgument`](crate::VolumeError::InvalidArgument).
#[async_trait]
pub trait IoDriver: Send + Sync {
    /// Read up to `buf.len()` bytes from `volume_id` starting at `offset`.
    ///
    /// Returns the number of bytes actually read, which is short when the
    /// read runs past the end of the volume.
    async fn read(&self, volume_id: &VolumeId, buf: &mut [u8], offset: i64) -> Result<u64>;

    /// Write `buf` to `volume_id` starting at `offset`.
    ///
    /// Returns the number of bytes actually written.
    async fn write(&self, volume_id: &VolumeId, buf: &[u8], offset: i64) -> Result<u64>;

    /// Make every prior write to `volume_id` durable.
    async fn flush(&self, volume_id: &VolumeId) -> Result<()>;
}

//! Block-attach capability.
//!
//! Block backends export a volume as a device on the host before it can be
//! mounted.  Filesystem backends have no such step; they implement
//! [`BlockDriver`] by delegating to [`DefaultBlockDriver`], which reports
//! the operation as not applicable.

use async_trait::async_trait;

use crate::error::{Result, VolumeError};
use crate::types::VolumeId;

/// Block-attach service — map a volume to a host device and back.
#[async_trait]
pub trait BlockDriver: Send + Sync {
    /// Export the volume as a device and return the device path.
    ///
    /// Fails with `VolumeNotFound` or `VolumeAttached`.
    async fn attach(&self, volume_id: &VolumeId) -> Result<String>;

    /// Remove the device mapping.
    ///
    /// Fails with `VolumeNotFound` or `VolumeDetached`.
    async fn detach(&self, volume_id: &VolumeId) -> Result<()>;
}

/// Block-attach for drivers without a block-device concept.
///
/// Both operations fail with [`VolumeError::NotSupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBlockDriver;

#[async_trait]
impl BlockDriver for DefaultBlockDriver {
    async fn attach(&self, volume_id: &VolumeId) -> Result<String> {
        Err(VolumeError::NotSupported(format!("attach {volume_id}")))
    }

    async fn detach(&self, volume_id: &VolumeId) -> Result<()> {
        Err(VolumeError::NotSupported(format!("detach {volume_id}")))
    }
}

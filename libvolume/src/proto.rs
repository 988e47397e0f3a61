//! Lifecycle capability.
//!
//! The baseline every driver implements: identity, volume creation and
//! deletion, mounting, updates, snapshots, diagnostics, and shutdown.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Alerts, DriverType, Source, Stats, VolumeId, VolumeLocator, VolumeSpec};

/// Lifecycle service — the mandatory part of every volume driver.
#[async_trait]
pub trait ProtoDriver: Send + Sync {
    /// Human-readable description of this driver.
    fn name(&self) -> String;

    /// Storage technology this driver exposes.
    fn driver_type(&self) -> DriverType;

    /// Create a volume and return its newly minted, globally unique id.
    async fn create(
        &self,
        locator: &VolumeLocator,
        source: &Source,
        spec: &VolumeSpec,
    ) -> Result<VolumeId>;

    /// Delete a volume.
    ///
    /// Fails with `VolumeNotFound`, or `VolumeHasSnapshots` while snapshots
    /// of the volume exist.
    async fn delete(&self, volume_id: &VolumeId) -> Result<()>;

    /// Mount the volume at `mount_path`.
    ///
    /// Fails with `VolumeNotFound` or `VolumeDetached`.
    async fn mount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()>;

    /// Unmount the volume from `mount_path`.
    ///
    /// Fails with `VolumeNotFound` or `VolumeDetached`.
    async fn unmount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()>;

    /// Apply a partial update.  `None` leaves that part untouched; a field
    /// the backend cannot change after creation yields `NotSupported`.
    async fn set(
        &self,
        volume_id: &VolumeId,
        locator: Option<&VolumeLocator>,
        spec: Option<&VolumeSpec>,
    ) -> Result<()>;

    /// Snapshot a volume and return the snapshot's volume id.
    async fn snapshot(
        &self,
        volume_id: &VolumeId,
        readonly: bool,
        locator: &VolumeLocator,
    ) -> Result<VolumeId>;

    /// I/O counters for a volume.
    async fn stats(&self, volume_id: &VolumeId) -> Result<Stats>;

    /// Alerts raised on a volume.
    async fn alerts(&self, volume_id: &VolumeId) -> Result<Alerts>;

    /// Low level diagnostic key/value pairs for the driver as a whole.
    async fn status(&self) -> Vec<(String, String)>;

    /// Release every resource the backend holds.
    ///
    /// Must be safe on a driver that never served I/O and safe to call more
    /// than once.  Failures are handled (logged) by the backend itself.
    async fn shutdown(&self);
}

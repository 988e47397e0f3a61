//! Shared helpers for the registry integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use libvolume::backend::mem::MemDriver;
use libvolume::{
    Alerts, BlockDriver, DriverType, Enumerator, IoDriver, ProtoDriver, Result, Source, Stats,
    Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use tracing_subscriber::EnvFilter;

static LOGGER: Once = Once::new();

/// Install a fmt subscriber once per test binary; `RUST_LOG` controls it.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory driver that counts how often it was shut down.
pub struct ProbeDriver {
    inner: MemDriver,
    pub shutdowns: Arc<AtomicUsize>,
}

impl ProbeDriver {
    pub fn new(shutdowns: Arc<AtomicUsize>) -> Self {
        Self {
            inner: MemDriver::new(None),
            shutdowns,
        }
    }
}

#[async_trait]
impl IoDriver for ProbeDriver {
    async fn read(&self, volume_id: &VolumeId, buf: &mut [u8], offset: i64) -> Result<u64> {
        self.inner.read(volume_id, buf, offset).await
    }

    async fn write(&self, volume_id: &VolumeId, buf: &[u8], offset: i64) -> Result<u64> {
        self.inner.write(volume_id, buf, offset).await
    }

    async fn flush(&self, volume_id: &VolumeId) -> Result<()> {
        self.inner.flush(volume_id).await
    }
}

#[async_trait]
impl ProtoDriver for ProbeDriver {
    fn name(&self) -> String {
        "probe".to_owned()
    }

    fn driver_type(&self) -> DriverType {
        self.inner.driver_type()
    }

    async fn create(
        &self,
        locator: &VolumeLocator,
        source: &Source,
        spec: &VolumeSpec,
    ) -> Result<VolumeId> {
        self.inner.create(locator, source, spec).await
    }

    async fn delete(&self, volume_id: &VolumeId) -> Result<()> {
        self.inner.delete(volume_id).await
    }

    async fn mount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()> {
        self.inner.mount(volume_id, mount_path).await
    }

    async fn unmount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()> {
        self.inner.unmount(volume_id, mount_path).await
    }

    async fn set(
        &self,
        volume_id: &VolumeId,
        locator: Option<&VolumeLocator>,
        spec: Option<&VolumeSpec>,
    ) -> Result<()> {
        self.inner.set(volume_id, locator, spec).await
    }

    async fn snapshot(
        &self,
        volume_id: &VolumeId,
        readonly: bool,
        locator: &VolumeLocator,
    ) -> Result<VolumeId> {
        self.inner.snapshot(volume_id, readonly, locator).await
    }

    async fn stats(&self, volume_id: &VolumeId) -> Result<Stats> {
        self.inner.stats(volume_id).await
    }

    async fn alerts(&self, volume_id: &VolumeId) -> Result<Alerts> {
        self.inner.alerts(volume_id).await
    }

    async fn status(&self) -> Vec<(String, String)> {
        self.inner.status().await
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown().await;
    }
}

#[async_trait]
impl BlockDriver for ProbeDriver {
    async fn attach(&self, volume_id: &VolumeId) -> Result<String> {
        self.inner.attach(volume_id).await
    }

    async fn detach(&self, volume_id: &VolumeId) -> Result<()> {
        self.inner.detach(volume_id).await
    }
}

#[async_trait]
impl Enumerator for ProbeDriver {
    async fn inspect(&self, volume_ids: &[VolumeId]) -> Result<Vec<Volume>> {
        self.inner.inspect(volume_ids).await
    }

    async fn enumerate(
        &self,
        locator: &VolumeLocator,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        self.inner.enumerate(locator, labels).await
    }

    async fn snap_enumerate(
        &self,
        volume_ids: &[VolumeId],
        snap_labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        self.inner.snap_enumerate(volume_ids, snap_labels).await
    }
}

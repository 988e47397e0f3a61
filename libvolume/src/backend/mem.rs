//! In-memory volume driver.
//!
//! [`MemDriver`] keeps every volume in process memory and implements all
//! four capability groups with block-device semantics: a volume must be
//! attached before it can be mounted, and data is readable and writable
//! through the data-transfer capability.  Nothing survives a restart.
//!
//! Volume ids are `v1`, `v2`, ... in creation order; they are unique for
//! the lifetime of the driver instance.
//!
//! Data is stored sparsely in fixed-size chunks allocated on first write.
//! Ranges never written read back as zeroes and cost no memory, so a volume
//! may declare any size.
//!
//! # Parameters
//!
//! | Key | Meaning |
//! |---|---|
//! | `max_volumes` | Upper bound on volumes and snapshots; `create` and `snapshot` fail with `OutOfMemory` beyond it. |

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::block::BlockDriver;
use crate::config::DriverParams;
use crate::driver::DriverHandle;
use crate::enumerate::{Enumerator, LocatorFilter, labels_match};
use crate::error::{Result, VolumeError};
use crate::io::IoDriver;
use crate::proto::ProtoDriver;
use crate::types::*;

/// Name the in-memory driver registers under.
pub const NAME: &str = "mem";

/// Factory for [`MemDriver`].
pub fn init(params: &DriverParams) -> Result<DriverHandle> {
    let max_volumes = params.parse::<u64>("max_volumes")?;
    info!(?max_volumes, "initializing in-memory volume driver");
    Ok(Arc::new(MemDriver::new(max_volumes)))
}

/// Allocation unit of volume data, in bytes.
pub const CHUNK_SIZE: u64 = 64 * 1024;

/// Sparse volume contents keyed by chunk index.
#[derive(Clone, Default)]
struct Blocks {
    chunks: BTreeMap<u64, Box<[u8]>>,
    /// One past the highest byte ever written.
    extent: u64,
}

impl Blocks {
    fn allocated(&self) -> u64 {
        self.chunks.len() as u64 * CHUNK_SIZE
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) {
        let mut pos = offset;
        let mut done = 0;
        while done < dst.len() {
            let within = (pos % CHUNK_SIZE) as usize;
            let n = (CHUNK_SIZE as usize - within).min(dst.len() - done);
            let out = &mut dst[done..done + n];
            match self.chunks.get(&(pos / CHUNK_SIZE)) {
                Some(chunk) => out.copy_from_slice(&chunk[within..within + n]),
                None => out.fill(0),
            }
            done += n;
            pos += n as u64;
        }
    }

    fn write_at(&mut self, offset: u64, src: &[u8]) {
        let mut pos = offset;
        let mut done = 0;
        while done < src.len() {
            let within = (pos % CHUNK_SIZE) as usize;
            let n = (CHUNK_SIZE as usize - within).min(src.len() - done);
            let chunk = self
                .chunks
                .entry(pos / CHUNK_SIZE)
                .or_insert_with(|| vec![0u8; CHUNK_SIZE as usize].into_boxed_slice());
            chunk[within..within + n].copy_from_slice(&src[done..done + n]);
            done += n;
            pos += n as u64;
        }
        self.extent = self.extent.max(pos);
    }
}

struct MemVolume {
    /// Creation order, used to keep enumeration output stable.
    seq: u64,
    meta: Volume,
    blocks: Blocks,
    stats: Stats,
    alerts: Vec<Alert>,
}

/// Volume driver that stores everything in memory.
///
/// # Thread safety
///
/// Volumes live in a [`DashMap`]; operations on different volumes proceed
/// concurrently.  Adding or removing a volume also takes `layout`, so the
/// volume limit and the parent/snapshot relation are checked and changed
/// in one step.
pub struct MemDriver {
    volumes: DashMap<VolumeId, MemVolume>,
    layout: Mutex<()>,
    next_id: AtomicU64,
    next_alert: AtomicU64,
    max_volumes: Option<u64>,
    shut_down: AtomicBool,
}

impl MemDriver {
    pub fn new(max_volumes: Option<u64>) -> Self {
        Self {
            volumes: DashMap::new(),
            layout: Mutex::new(()),
            next_id: AtomicU64::new(1),
            next_alert: AtomicU64::new(1),
            max_volumes,
            shut_down: AtomicBool::new(false),
        }
    }

    fn with_volume<R>(
        &self,
        volume_id: &VolumeId,
        f: impl FnOnce(&mut MemVolume) -> Result<R>,
    ) -> Result<R> {
        let mut vol = self
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume_id.to_string()))?;
        f(&mut vol)
    }

    fn layout(&self) -> MutexGuard<'_, ()> {
        self.layout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_capacity(&self) -> Result<()> {
        if let Some(max) = self.max_volumes
            && self.volumes.len() as u64 >= max
        {
            return Err(VolumeError::OutOfMemory(format!("volume limit {max} reached")));
        }
        Ok(())
    }

    /// Mint an id, build the volume's metadata for it, and store it.
    /// Callers hold `layout`.
    fn insert(&self, blocks: Blocks, build: impl FnOnce(VolumeId) -> Volume) -> VolumeId {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = VolumeId(format!("v{seq}"));
        let mut meta = build(id.clone());
        meta.usage = blocks.allocated();
        self.volumes.insert(
            id.clone(),
            MemVolume {
                seq,
                meta,
                blocks,
                stats: Stats::default(),
                alerts: Vec::new(),
            },
        );
        id
    }

    fn raise(&self, vol: &mut MemVolume, severity: Severity, message: String) {
        warn!(volume_id = %vol.meta.id, %message, "volume alert");
        vol.alerts.push(Alert {
            id: self.next_alert.fetch_add(1, Ordering::SeqCst),
            severity,
            message,
            timestamp: SystemTime::now(),
        });
    }

    fn has_snapshots(&self, volume_id: &VolumeId) -> bool {
        self.volumes
            .iter()
            .any(|entry| {
                entry.meta.is_snapshot() && entry.meta.source.parent.as_ref() == Some(volume_id)
            })
    }

    /// Collect matching volumes ordered by creation.
    fn collect(&self, mut keep: impl FnMut(&Volume) -> bool) -> Vec<Volume> {
        let mut found: Vec<(u64, Volume)> = self
            .volumes
            .iter()
            .filter(|entry| keep(&entry.meta))
            .map(|entry| (entry.seq, entry.meta.clone()))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, vol)| vol).collect()
    }
}

fn to_offset(offset: i64) -> Result<u64> {
    u64::try_from(offset)
        .map_err(|_| VolumeError::InvalidArgument(format!("negative offset {offset}")))
}

// ---------------------------------------------------------------------------
// IoDriver
// ---------------------------------------------------------------------------

#[async_trait]
impl IoDriver for MemDriver {
    async fn read(&self, volume_id: &VolumeId, buf: &mut [u8], offset: i64) -> Result<u64> {
        let offset = to_offset(offset)?;
        self.with_volume(volume_id, |vol| {
            let size = vol.meta.spec.size;
            if offset >= size || buf.is_empty() {
                return Ok(0);
            }
            // Bounded by `buf.len()`, so it fits in usize.
            let len = (size - offset).min(buf.len() as u64) as usize;
            vol.blocks.read_at(offset, &mut buf[..len]);

            vol.stats.reads += 1;
            vol.stats.read_bytes += len as u64;
            Ok(len as u64)
        })
    }

    async fn write(&self, volume_id: &VolumeId, buf: &[u8], offset: i64) -> Result<u64> {
        let offset = to_offset(offset)?;
        self.with_volume(volume_id, |vol| {
            if vol.meta.readonly {
                return Err(VolumeError::InvalidArgument(format!(
                    "volume {volume_id} is read-only"
                )));
            }
            let end = offset + buf.len() as u64;
            if end > vol.meta.spec.size {
                let message = format!(
                    "write of {} bytes at {offset} exceeds size {}",
                    buf.len(),
                    vol.meta.spec.size
                );
                self.raise(vol, Severity::Warning, message.clone());
                return Err(VolumeError::InvalidArgument(message));
            }
            vol.blocks.write_at(offset, buf);
            vol.meta.usage = vol.blocks.allocated();

            vol.stats.writes += 1;
            vol.stats.write_bytes += buf.len() as u64;
            Ok(buf.len() as u64)
        })
    }

    async fn flush(&self, volume_id: &VolumeId) -> Result<()> {
        // Memory is as durable as this driver gets.
        self.with_volume(volume_id, |_| Ok(()))
    }
}

// ---------------------------------------------------------------------------
// ProtoDriver
// ---------------------------------------------------------------------------

#[async_trait]
impl ProtoDriver for MemDriver {
    fn name(&self) -> String {
        NAME.to_owned()
    }

    fn driver_type(&self) -> DriverType {
        DriverType::Block
    }

    #[instrument(skip(self, spec), fields(name = %locator.name))]
    async fn create(
        &self,
        locator: &VolumeLocator,
        source: &Source,
        spec: &VolumeSpec,
    ) -> Result<VolumeId> {
        let _layout = self.layout();
        self.ensure_capacity()?;

        // A parent in the source makes this a clone of that volume.
        let blocks = match &source.parent {
            Some(parent) => self.with_volume(parent, |vol| Ok(vol.blocks.clone()))?,
            None => Blocks::default(),
        };
        if let Some(seed) = &source.seed {
            debug!(%seed, "seed sources are not fetched by the in-memory driver");
        }
        if blocks.extent > spec.size {
            return Err(VolumeError::InvalidArgument(format!(
                "size {} is smaller than the source volume",
                spec.size
            )));
        }

        let id = self.insert(blocks, |id| Volume {
            id,
            source: source.clone(),
            readonly: false,
            snapshot: false,
            locator: locator.clone(),
            ctime: SystemTime::now(),
            spec: spec.clone(),
            usage: 0,
            format: spec.format,
            state: VolumeState::Available,
            attach: AttachState::Detached,
            device_path: None,
            attach_path: Vec::new(),
        });
        info!(%id, "volume created");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn delete(&self, volume_id: &VolumeId) -> Result<()> {
        let _layout = self.layout();
        if !self.volumes.contains_key(volume_id) {
            return Err(VolumeError::VolumeNotFound(volume_id.to_string()));
        }
        if self.has_snapshots(volume_id) {
            warn!("delete refused, volume has snapshots");
            return Err(VolumeError::VolumeHasSnapshots(volume_id.to_string()));
        }
        // `attach` does not take `layout`; check and remove under the shard lock.
        let removed = self
            .volumes
            .remove_if(volume_id, |_, vol| vol.meta.attach != AttachState::Attached);
        if removed.is_none() {
            return Err(VolumeError::VolumeAttached(volume_id.to_string()));
        }
        info!("volume deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()> {
        if mount_path.is_empty() {
            return Err(VolumeError::InvalidArgument("empty mount path".into()));
        }
        self.with_volume(volume_id, |vol| {
            if vol.meta.attach != AttachState::Attached {
                return Err(VolumeError::VolumeDetached(volume_id.to_string()));
            }
            if vol.meta.attach_path.iter().any(|p| p == mount_path) {
                debug!("already mounted, assuming idempotent retry");
                return Ok(());
            }
            vol.meta.attach_path.push(mount_path.to_owned());
            info!("volume mounted");
            Ok(())
        })
    }

    #[instrument(skip(self))]
    async fn unmount(&self, volume_id: &VolumeId, mount_path: &str) -> Result<()> {
        self.with_volume(volume_id, |vol| {
            let Some(pos) = vol.meta.attach_path.iter().position(|p| p == mount_path) else {
                return Err(VolumeError::VolumeDetached(volume_id.to_string()));
            };
            vol.meta.attach_path.remove(pos);
            info!("volume unmounted");
            Ok(())
        })
    }

    #[instrument(skip(self, locator, spec))]
    async fn set(
        &self,
        volume_id: &VolumeId,
        locator: Option<&VolumeLocator>,
        spec: Option<&VolumeSpec>,
    ) -> Result<()> {
        self.with_volume(volume_id, |vol| {
            if let Some(spec) = spec {
                let current = &vol.meta.spec;
                if spec.size < current.size {
                    return Err(VolumeError::NotSupported(format!(
                        "shrinking {volume_id} from {} to {}",
                        current.size, spec.size
                    )));
                }
                if spec.format != current.format {
                    return Err(VolumeError::NotSupported(format!(
                        "changing format of {volume_id}"
                    )));
                }
                if spec.block_size != current.block_size {
                    return Err(VolumeError::NotSupported(format!(
                        "changing block size of {volume_id}"
                    )));
                }
                vol.meta.spec = spec.clone();
            }
            if let Some(locator) = locator {
                vol.meta.locator = locator.clone();
            }
            info!("volume updated");
            Ok(())
        })
    }

    #[instrument(skip(self, locator))]
    async fn snapshot(
        &self,
        volume_id: &VolumeId,
        readonly: bool,
        locator: &VolumeLocator,
    ) -> Result<VolumeId> {
        let _layout = self.layout();
        let (spec, blocks) =
            self.with_volume(volume_id, |vol| Ok((vol.meta.spec.clone(), vol.blocks.clone())))?;
        self.ensure_capacity()?;

        let id = self.insert(blocks, |id| Volume {
            id,
            source: Source {
                parent: Some(volume_id.clone()),
                seed: None,
            },
            readonly,
            snapshot: true,
            locator: locator.clone(),
            ctime: SystemTime::now(),
            format: spec.format,
            spec,
            usage: 0,
            state: VolumeState::Available,
            attach: AttachState::Detached,
            device_path: None,
            attach_path: Vec::new(),
        });
        info!(snapshot_id = %id, "snapshot created");
        Ok(id)
    }

    async fn stats(&self, volume_id: &VolumeId) -> Result<Stats> {
        self.with_volume(volume_id, |vol| {
            let mut stats = vol.stats.clone();
            stats.bytes_used = vol.meta.usage;
            stats.interval_ms = SystemTime::now()
                .duration_since(vol.meta.ctime)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0);
            Ok(stats)
        })
    }

    async fn alerts(&self, volume_id: &VolumeId) -> Result<Alerts> {
        self.with_volume(volume_id, |vol| {
            Ok(Alerts {
                alerts: vol.alerts.clone(),
            })
        })
    }

    async fn status(&self) -> Vec<(String, String)> {
        let snapshots = self.volumes.iter().filter(|e| e.meta.is_snapshot()).count();
        let volumes = self.volumes.len() - snapshots;
        vec![
            ("Driver".to_owned(), NAME.to_owned()),
            ("Volumes".to_owned(), volumes.to_string()),
            ("Snapshots".to_owned(), snapshots.to_string()),
        ]
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("in-memory driver already shut down");
            return;
        }
        let count = self.volumes.len();
        self.volumes.clear();
        info!(released = count, "in-memory driver shut down");
    }
}

// ---------------------------------------------------------------------------
// BlockDriver
// ---------------------------------------------------------------------------

#[async_trait]
impl BlockDriver for MemDriver {
    #[instrument(skip(self))]
    async fn attach(&self, volume_id: &VolumeId) -> Result<String> {
        self.with_volume(volume_id, |vol| {
            if vol.meta.attach == AttachState::Attached {
                return Err(VolumeError::VolumeAttached(volume_id.to_string()));
            }
            let device = format!("/dev/mem/{volume_id}");
            vol.meta.attach = AttachState::Attached;
            vol.meta.device_path = Some(device.clone());
            info!(%device, "volume attached");
            Ok(device)
        })
    }

    #[instrument(skip(self))]
    async fn detach(&self, volume_id: &VolumeId) -> Result<()> {
        self.with_volume(volume_id, |vol| {
            if vol.meta.attach != AttachState::Attached {
                return Err(VolumeError::VolumeDetached(volume_id.to_string()));
            }
            if !vol.meta.attach_path.is_empty() {
                return Err(VolumeError::InvalidArgument(format!(
                    "volume {volume_id} is still mounted at {}",
                    vol.meta.attach_path.join(", ")
                )));
            }
            vol.meta.attach = AttachState::Detached;
            vol.meta.device_path = None;
            info!("volume detached");
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Enumerator
// ---------------------------------------------------------------------------

#[async_trait]
impl Enumerator for MemDriver {
    async fn inspect(&self, volume_ids: &[VolumeId]) -> Result<Vec<Volume>> {
        Ok(volume_ids
            .iter()
            .filter_map(|id| self.volumes.get(id).map(|vol| vol.meta.clone()))
            .collect())
    }

    async fn enumerate(
        &self,
        locator: &VolumeLocator,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        let filter = LocatorFilter::new(locator)?;
        let any_locator = filter.matches_all();
        Ok(self.collect(|vol| {
            !vol.is_snapshot()
                && (any_locator || filter.matches(&vol.locator))
                && labels_match(&vol.spec.labels, labels)
        }))
    }

    async fn snap_enumerate(
        &self,
        volume_ids: &[VolumeId],
        snap_labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        Ok(self.collect(|vol| {
            let Some(parent) = vol.source.parent.as_ref().filter(|_| vol.is_snapshot()) else {
                return false;
            };
            (volume_ids.is_empty() || volume_ids.contains(parent))
                && labels_match(&vol.locator.volume_labels, snap_labels)
        }))
    }
}

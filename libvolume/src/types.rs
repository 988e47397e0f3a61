//! Core volume types: identifiers, locators, specs, and diagnostics.
//!
//! These types form the data model shared by the capability traits, the
//! registry, and backend implementations.  They are all
//! [`Serialize`]/[`Deserialize`] so an API layer can ship them as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, globally unique identifier for a volume or snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub String);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Driver classification
// ---------------------------------------------------------------------------

/// Storage technology a driver exposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverType {
    /// Files on a shared or local filesystem.
    File,
    /// Raw block devices.
    Block,
    /// Object store buckets.
    Object,
    /// Volumes spread across a cluster of nodes.
    Clustered,
    /// Graph (layered image) storage.
    Graph,
}

/// Filesystem a volume is formatted with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FsFormat {
    /// Unformatted block storage.
    #[default]
    None,
    Ext4,
    Xfs,
    Btrfs,
}

// ---------------------------------------------------------------------------
// Locator, source, spec
// ---------------------------------------------------------------------------

/// Name and labels describing a volume; used for enumeration filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeLocator {
    /// User-facing volume name.
    #[serde(default)]
    pub name: String,
    /// Free-form labels attached to the volume.
    #[serde(default)]
    pub volume_labels: HashMap<String, String>,
}

impl VolumeLocator {
    /// Locator with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume_labels: HashMap::new(),
        }
    }

    /// Add a label, builder style.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.volume_labels.insert(key.into(), value.into());
        self
    }
}

/// Where a volume's initial contents come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    /// Parent volume; set on snapshots and clones.
    #[serde(default)]
    pub parent: Option<VolumeId>,
    /// Backend-defined seed URI used to pre-populate the volume.
    #[serde(default)]
    pub seed: Option<String>,
}

/// Desired properties of a volume at creation or update time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Provisioned size in bytes.
    pub size: u64,
    #[serde(default)]
    pub format: FsFormat,
    /// Block size in bytes.
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    /// Number of replicas.
    #[serde(default = "default_ha_level")]
    pub ha_level: u32,
    /// Class of service.
    #[serde(default)]
    pub cos: u32,
    /// Whether the volume may be mounted on several hosts.
    #[serde(default)]
    pub shared: bool,
    /// Configuration labels, matched by `enumerate`'s label filter.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_block_size() -> u64 {
    4096
}

fn default_ha_level() -> u32 {
    1
}

impl Default for VolumeSpec {
    fn default() -> Self {
        Self {
            size: 0,
            format: FsFormat::default(),
            block_size: default_block_size(),
            ha_level: default_ha_level(),
            cos: 0,
            shared: false,
            labels: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Volume metadata
// ---------------------------------------------------------------------------

/// Lifecycle state of a volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeState {
    /// Being provisioned.
    Pending,
    /// Provisioned and usable.
    Available,
    /// Marked for deletion.
    Deleted,
    /// Backend reported a failure for this volume.
    Error,
}

/// Whether the volume is exported as a device on this host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachState {
    #[default]
    Detached,
    Attached,
}

/// Full metadata for a volume, as returned by the enumeration capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub source: Source,
    /// Snapshots may be created read-only.
    pub readonly: bool,
    /// Set by `snapshot`.  A volume created from a parent `source` is a
    /// clone and keeps this `false`.
    #[serde(default)]
    pub snapshot: bool,
    pub locator: VolumeLocator,
    /// Creation time.
    pub ctime: SystemTime,
    pub spec: VolumeSpec,
    /// Bytes in use.
    pub usage: u64,
    pub format: FsFormat,
    pub state: VolumeState,
    pub attach: AttachState,
    /// Device path assigned by `attach`.
    #[serde(default)]
    pub device_path: Option<String>,
    /// Paths the volume is currently mounted at.
    #[serde(default)]
    pub attach_path: Vec<String>,
}

impl Volume {
    /// `true` when this volume is a snapshot of another volume.
    pub fn is_snapshot(&self) -> bool {
        self.snapshot && self.source.parent.is_some()
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// I/O counters for a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub bytes_used: u64,
    /// Interval the counters cover, in milliseconds since creation.
    pub interval_ms: u64,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Notify,
    Warning,
    Alarm,
}

/// A single alert raised by the backend for a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: SystemTime,
}

/// Alerts raised on a volume, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alerts {
    pub alerts: Vec<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
    }

    #[test]
    fn volume_spec_defaults() {
        let spec = VolumeSpec::default();
        assert_eq!(spec.block_size, 4096);
        assert_eq!(spec.ha_level, 1);
        assert_eq!(spec.format, FsFormat::None);
    }

    #[test]
    fn spec_fills_defaults_from_json() {
        let spec: VolumeSpec = serde_json::from_str(r#"{"size": 1024}"#).expect("deserialize");
        assert_eq!(spec.size, 1024);
        assert_eq!(spec.block_size, 4096);
        assert!(spec.labels.is_empty());
    }

    #[test]
    fn locator_builder() {
        let loc = VolumeLocator::named("db").with_label("tier", "gold");
        assert_eq!(loc.name, "db");
        assert_eq!(loc.volume_labels.get("tier").map(String::as_str), Some("gold"));
    }
}

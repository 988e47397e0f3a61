//! Driver configuration.
//!
//! [`DriverParams`] is the flat string map handed verbatim to a driver
//! factory.  [`VolumeConfig`] is what the composition root reads to decide
//! which drivers to bring up at start.
//!
//! Environment variables:
//! - `RK8S_VOLUME_CONFIG`: path to a YAML [`VolumeConfig`] file.  When unset
//!   no drivers are instantiated at start.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "RK8S_VOLUME_CONFIG";

/// Driver-specific configuration passed to a factory.
///
/// The registry never looks inside; only the backend knows which keys it
/// accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DriverParams(pub HashMap<String, String>);

impl DriverParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse an optional parameter.  A present but malformed value is an
    /// [`VolumeError::InvalidArgument`].
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| VolumeError::InvalidArgument(format!("{key}={raw}: {e}")))
            })
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for DriverParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for DriverParams {
    fn from(pairs: [(K, V); N]) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One driver the composition root should instantiate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverConfig {
    /// Registered driver name, e.g. `"mem"`.
    pub name: String,
    #[serde(default)]
    pub params: DriverParams,
}

/// Start-up configuration for the volume subsystem.
///
/// ```yaml
/// drivers:
///   - name: mem
///     params:
///       max_volumes: "64"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeConfig {
    #[serde(default)]
    pub drivers: Vec<DriverConfig>,
}

impl VolumeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| VolumeError::InvalidArgument(format!("volume config: {e}")))
    }

    /// Read and parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VolumeError::backend(format!("read {}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    /// Load the file named by [`CONFIG_ENV`], or an empty config if the
    /// variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_present_and_absent() {
        let params = DriverParams::from([("max_volumes", "8")]);
        assert_eq!(params.parse::<u64>("max_volumes").unwrap(), Some(8));
        assert_eq!(params.parse::<u64>("missing").unwrap(), None);
    }

    #[test]
    fn parse_malformed_is_invalid_argument() {
        let params = DriverParams::from([("max_volumes", "lots")]);
        let err = params.parse::<u64>("max_volumes").unwrap_err();
        assert!(matches!(err, VolumeError::InvalidArgument(_)));
    }

    #[test]
    fn yaml_config() {
        let cfg = VolumeConfig::from_yaml_str(
            "drivers:\n  - name: mem\n    params:\n      max_volumes: \"4\"\n  - name: other\n",
        )
        .unwrap();
        assert_eq!(cfg.drivers.len(), 2);
        assert_eq!(cfg.drivers[0].name, "mem");
        assert_eq!(cfg.drivers[0].params.get("max_volumes"), Some("4"));
        assert!(cfg.drivers[1].params.is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "drivers:\n  - name: mem").unwrap();
        let cfg = VolumeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.drivers.len(), 1);
    }

    #[test]
    fn load_missing_file_is_backend_error() {
        let err = VolumeConfig::load("/nonexistent/volume.yaml").unwrap_err();
        assert!(matches!(err, VolumeError::Backend(_)));
    }
}

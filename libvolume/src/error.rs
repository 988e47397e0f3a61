//! Volume driver error types.
//!
//! Every operation in `libvolume`, whether it is a registry call or a
//! capability method on a driver, reports failure through [`VolumeError`].
//! The enum derives [`thiserror::Error`] and also implements
//! [`Serialize`]/[`Deserialize`] so an API layer can forward errors verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = VolumeError> = std::result::Result<T, E>;

/// Unified error type shared by the registry and every volume driver.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// A factory or a live instance is already recorded under this name.
    #[error("driver {0} already exists")]
    AlreadyExists(String),

    /// No factory is registered under the name, or the backend cannot
    /// perform the requested operation.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// No live instance exists for the requested driver name.
    #[error("driver implementation {0} not found")]
    DriverNotFound(String),

    /// The driver exists but is not ready to serve requests yet.
    #[error("driver {0} is initializing")]
    DriverInitializing(String),

    /// No volume exists with the requested id.
    #[error("volume {0} does not exist")]
    VolumeNotFound(String),

    /// The backend ran out of capacity.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The volume must be attached (or mounted) for this operation.
    #[error("volume {0} is detached")]
    VolumeDetached(String),

    /// The volume is already attached.
    #[error("volume {0} is attached")]
    VolumeAttached(String),

    /// The volume still has snapshots that depend on it.
    #[error("volume {0} has snapshots associated")]
    VolumeHasSnapshots(String),

    /// A backend-specific failure, e.g. a factory that cannot reach its
    /// storage service.
    #[error("backend error: {0}")]
    Backend(String),
}

impl VolumeError {
    /// Create a [`VolumeError::Backend`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

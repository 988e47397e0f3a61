//! # libvolume — volume driver contract and registry for RK8s
//!
//! `libvolume` defines what a storage backend ("volume driver") must
//! implement and keeps the process-wide bookkeeping of which drivers are
//! registered and live.  Backends plug in by handing a factory to the
//! [`DriverRegistry`]; the rest of the platform instantiates them by name and
//! talks to them only through the [`VolumeDriver`] contract.  It follows the
//! RK8s conventions (Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Data model: `VolumeId`, `VolumeLocator`, `VolumeSpec`, `Volume`, stats. |
//! | [`error`] | [`VolumeError`] enum covering all failure modes. |
//! | [`config`] | [`DriverParams`] for factories, [`VolumeConfig`] for start-up. |
//! | [`io`] | [`IoDriver`] trait — read, write, flush. |
//! | [`proto`] | [`ProtoDriver`] trait — create, delete, mount, snapshot, shutdown. |
//! | [`enumerate`] | [`Enumerator`] trait — inspect and filter volumes. |
//! | [`block`] | [`BlockDriver`] trait — attach and detach devices. |
//! | [`driver`] | [`VolumeDriver`] aggregate and [`DriverFactory`]. |
//! | [`registry`] | [`DriverRegistry`] — register, instantiate, lookup, shutdown. |
//! | [`backend`] | Built-in backends (in-memory). |
//! | [`bootstrap`] | Composition root wiring backends into a registry. |

pub mod backend;
pub mod block;
pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod enumerate;
pub mod error;
pub mod io;
pub mod proto;
pub mod registry;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use block::{BlockDriver, DefaultBlockDriver};
pub use config::{DriverParams, VolumeConfig};
pub use driver::{DriverFactory, DriverHandle, VolumeDriver};
pub use enumerate::Enumerator;
pub use error::{Result, VolumeError};
pub use io::IoDriver;
pub use proto::ProtoDriver;
pub use registry::DriverRegistry;
pub use types::*;

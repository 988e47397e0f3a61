//! The aggregate volume-driver contract and the factory that builds one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::block::BlockDriver;
use crate::config::DriverParams;
use crate::enumerate::Enumerator;
use crate::error::Result;
use crate::io::IoDriver;
use crate::proto::ProtoDriver;

/// Everything a storage backend must implement.
///
/// There is nothing to implement directly: any type that implements all
/// four capability traits is a `VolumeDriver`.
pub trait VolumeDriver: IoDriver + ProtoDriver + BlockDriver + Enumerator {}

impl<T> VolumeDriver for T where T: IoDriver + ProtoDriver + BlockDriver + Enumerator {}

/// Shared handle to a live driver instance, as handed out by the registry.
pub type DriverHandle = Arc<dyn VolumeDriver>;

/// Builds a driver instance from its configuration.
///
/// Plain functions and closures of the shape
/// `Fn(&DriverParams) -> Result<DriverHandle>` are factories already; a
/// backend that needs to await during construction (connection setup, state
/// recovery) implements this trait on its own type.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn build(&self, params: &DriverParams) -> Result<DriverHandle>;
}

#[async_trait]
impl<F> DriverFactory for F
where
    F: Fn(&DriverParams) -> Result<DriverHandle> + Send + Sync,
{
    async fn build(&self, params: &DriverParams) -> Result<DriverHandle> {
        self(params)
    }
}

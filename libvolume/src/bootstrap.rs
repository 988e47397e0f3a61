//! Composition root for the volume subsystem.
//!
//! Backends do not register themselves.  The process calls
//! [`register_builtin`] (or registers its own factories) and then
//! [`bootstrap`] to bring up the drivers named in its [`VolumeConfig`].

use tracing::{debug, info, instrument};

use crate::backend::mem;
use crate::config::VolumeConfig;
use crate::driver::DriverHandle;
use crate::error::{Result, VolumeError};
use crate::registry::DriverRegistry;

/// Register the factory of every backend shipped with this crate.
pub fn register_builtin(registry: &DriverRegistry) -> Result<()> {
    registry.register(mem::NAME, mem::init)?;
    Ok(())
}

/// Register the built-in backends and instantiate every driver in
/// `config`, in order.
///
/// Built-ins already registered (for example by an earlier
/// [`register_builtin`]) are kept.  Stops at the first instantiate failure
/// and returns it; drivers instantiated before the failure stay live in the
/// registry.
#[instrument(skip_all, fields(drivers = config.drivers.len()))]
pub async fn bootstrap(
    registry: &DriverRegistry,
    config: &VolumeConfig,
) -> Result<Vec<DriverHandle>> {
    match register_builtin(registry) {
        Ok(()) => {}
        Err(VolumeError::AlreadyExists(name)) => debug!(%name, "built-in already registered"),
        Err(e) => return Err(e),
    }

    let mut drivers = Vec::with_capacity(config.drivers.len());
    for driver in &config.drivers {
        drivers.push(registry.instantiate(&driver.name, &driver.params).await?);
    }
    info!(names = ?registry.instantiated(), "volume drivers ready");
    Ok(drivers)
}

/// [`bootstrap`] with the config named by `RK8S_VOLUME_CONFIG`.
pub async fn bootstrap_from_env(registry: &DriverRegistry) -> Result<Vec<DriverHandle>> {
    let config = VolumeConfig::from_env()?;
    bootstrap(registry, &config).await
}

//! Process-wide bookkeeping of volume drivers.
//!
//! [`DriverRegistry`] maps a driver name to the factory that builds it and
//! to at most one live instance.  A name only moves forward through
//! `Unregistered → Registered → Instantiated → ShutDown`; nothing is ever
//! unregistered or removed.
//!
//! # Concurrency
//!
//! All bookkeeping sits behind one mutex that is never held across an
//! `.await`.  `instantiate` reserves the name under the lock, runs the
//! factory with the lock released, then installs the result under the lock
//! again.  While a name is reserved every other `instantiate` for it fails
//! with `AlreadyExists`, so a slow factory only delays callers of that name
//! and at most one instance is ever installed per name.
//!
//! `shutdown_all` closes the registry under the same lock.  A factory that
//! finishes after that point has its driver shut down instead of installed,
//! and no new name can be instantiated.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use crate::config::DriverParams;
use crate::driver::{DriverFactory, DriverHandle};
use crate::error::{Result, VolumeError};
use crate::proto::ProtoDriver;

static GLOBAL: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::new);

struct Instance {
    driver: DriverHandle,
    shut_down: bool,
}

#[derive(Default)]
struct RegistryState {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
    instances: HashMap<String, Instance>,
    /// Names whose factory is running right now.
    pending: HashSet<String>,
    /// Set by the first `shutdown_all`.
    closed: bool,
}

/// Registry of driver factories and live driver instances.
///
/// Use [`DriverRegistry::global`] for the process-wide registry, or
/// [`DriverRegistry::new`] for an isolated one (tests, embedded use).
#[derive(Default)]
pub struct DriverRegistry {
    state: Mutex<RegistryState>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created empty on first access.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        // Nothing panics while holding the lock, but a poisoned map is still
        // consistent: every mutation is a single insert or remove.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `factory` under `name`.
    ///
    /// Fails with `AlreadyExists` if the name already has a factory; the
    /// existing factory is kept.
    #[instrument(skip(self, factory))]
    pub fn register<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: DriverFactory + 'static,
    {
        validate_name(name)?;
        let mut state = self.state();
        if state.factories.contains_key(name) {
            warn!("driver factory already registered");
            return Err(VolumeError::AlreadyExists(name.to_owned()));
        }
        state.factories.insert(name.to_owned(), Arc::new(factory));
        info!("driver factory registered");
        Ok(())
    }

    /// Build the instance for `name` and install it.
    ///
    /// This only ever creates: if an instance exists, or another caller is
    /// building one, it fails with `AlreadyExists`.  Without a registered
    /// factory, or once [`shutdown_all`](Self::shutdown_all) has run, it
    /// fails with `NotSupported`.  A factory error is returned as-is and
    /// leaves the name free for a retry.
    #[instrument(skip(self, params))]
    pub async fn instantiate(&self, name: &str, params: &DriverParams) -> Result<DriverHandle> {
        let (factory, reservation) = self.reserve(name)?;
        match factory.build(params).await {
            Ok(driver) => {
                if !reservation.install(Arc::clone(&driver)) {
                    warn!("registry shut down while the factory ran, discarding driver");
                    driver.shutdown().await;
                    return Err(closed_error());
                }
                info!("driver instantiated");
                Ok(driver)
            }
            Err(e) => {
                warn!(error = %e, "driver factory failed");
                Err(e)
            }
        }
    }

    fn reserve(&self, name: &str) -> Result<(Arc<dyn DriverFactory>, Reservation<'_>)> {
        let mut state = self.state();
        if state.instances.contains_key(name) || state.pending.contains(name) {
            warn!("driver already instantiated");
            return Err(VolumeError::AlreadyExists(name.to_owned()));
        }
        if state.closed {
            warn!("registry is shut down");
            return Err(closed_error());
        }
        let Some(factory) = state.factories.get(name).cloned() else {
            warn!("no factory registered");
            return Err(VolumeError::NotSupported(format!("driver {name}")));
        };
        state.pending.insert(name.to_owned());
        Ok((
            factory,
            Reservation {
                registry: self,
                name: name.to_owned(),
            },
        ))
    }

    /// The live instance for `name`, or `DriverNotFound`.
    pub fn lookup(&self, name: &str) -> Result<DriverHandle> {
        let state = self.state();
        match state.instances.get(name) {
            Some(instance) => Ok(Arc::clone(&instance.driver)),
            None => {
                debug!(name, "driver lookup missed");
                Err(VolumeError::DriverNotFound(name.to_owned()))
            }
        }
    }

    /// Shut down every live instance, each exactly once.
    ///
    /// Instances stay in the registry so [`lookup`](Self::lookup) still
    /// finds them, but they must not be used for I/O afterwards.  The
    /// registry is closed: an `instantiate` still running its factory shuts
    /// its driver down itself and fails.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let drivers: Vec<(String, DriverHandle)> = {
            let mut state = self.state();
            state.closed = true;
            state
                .instances
                .iter_mut()
                .filter(|(_, instance)| !instance.shut_down)
                .map(|(name, instance)| {
                    instance.shut_down = true;
                    (name.clone(), Arc::clone(&instance.driver))
                })
                .collect()
        };

        for (name, driver) in &drivers {
            debug!(%name, "shutting down driver");
            driver.shutdown().await;
        }
        info!(count = drivers.len(), "drivers shut down");
    }

    /// Names with a registered factory, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names with a live instance, sorted.
    pub fn instantiated(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().instances.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A name reserved for an in-flight `instantiate`.  Dropping it without
/// installing (factory error, cancelled future) frees the name again.
struct Reservation<'a> {
    registry: &'a DriverRegistry,
    name: String,
}

impl Reservation<'_> {
    /// Install `driver` unless the registry was closed meanwhile.
    fn install(self, driver: DriverHandle) -> bool {
        let mut state = self.registry.state();
        if state.closed {
            return false;
        }
        state.instances.insert(
            self.name.clone(),
            Instance {
                driver,
                shut_down: false,
            },
        );
        // `self` drops after the guard is released and clears `pending`.
        true
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.registry.state().pending.remove(&self.name);
    }
}

fn closed_error() -> VolumeError {
    VolumeError::NotSupported("driver registry is shut down".into())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VolumeError::InvalidArgument("empty driver name".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backend::mem;

    fn counting_factory(calls: Arc<AtomicUsize>) -> impl DriverFactory + 'static {
        move |params: &DriverParams| {
            calls.fetch_add(1, Ordering::SeqCst);
            mem::init(params)
        }
    }

    #[test]
    fn register_twice_keeps_first_factory() {
        let registry = DriverRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.register("mem", counting_factory(Arc::clone(&first))).unwrap();
        let err = registry
            .register("mem", counting_factory(Arc::clone(&second)))
            .unwrap_err();
        assert_eq!(err, VolumeError::AlreadyExists("mem".into()));
        assert_eq!(registry.registered(), vec!["mem".to_owned()]);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(registry.instantiate("mem", &DriverParams::new())).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_name_rejected() {
        let registry = DriverRegistry::new();
        let err = registry.register("", mem::init).unwrap_err();
        assert!(matches!(err, VolumeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn instantiate_unregistered_is_not_supported() {
        let registry = DriverRegistry::new();
        let err = registry
            .instantiate("nope", &DriverParams::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VolumeError::NotSupported(_)));
        assert!(registry.instantiated().is_empty());
    }

    #[tokio::test]
    async fn instantiate_is_create_only() {
        let registry = DriverRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register("mem", counting_factory(Arc::clone(&calls))).unwrap();

        let first = registry.instantiate("mem", &DriverParams::new()).await.unwrap();
        let err = registry
            .instantiate("mem", &DriverParams::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err, VolumeError::AlreadyExists("mem".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let found = registry.lookup("mem").unwrap();
        assert!(Arc::ptr_eq(&first, &found));
    }

    #[tokio::test]
    async fn failed_factory_leaves_name_retriable() {
        let registry = DriverRegistry::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        registry
            .register("flaky", move |params: &DriverParams| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VolumeError::backend("connection refused"))
                } else {
                    mem::init(params)
                }
            })
            .unwrap();

        let err = registry
            .instantiate("flaky", &DriverParams::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err, VolumeError::Backend("connection refused".into()));
        assert!(matches!(
            registry.lookup("flaky"),
            Err(VolumeError::DriverNotFound(_))
        ));

        registry.instantiate("flaky", &DriverParams::new()).await.unwrap();
        assert!(registry.lookup("flaky").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lookup_before_instantiate_is_driver_not_found() {
        let registry = DriverRegistry::new();
        registry.register("mem", mem::init).unwrap();
        let err = registry.lookup("mem").err().unwrap();
        assert_eq!(err, VolumeError::DriverNotFound("mem".into()));
    }

    #[tokio::test]
    async fn shutdown_all_without_instances_is_noop() {
        let registry = DriverRegistry::new();
        registry.register("mem", mem::init).unwrap();
        registry.shutdown_all().await;
        assert!(registry.instantiated().is_empty());
    }

    #[tokio::test]
    async fn lookup_survives_shutdown() {
        let registry = DriverRegistry::new();
        registry.register("mem", mem::init).unwrap();
        let driver = registry.instantiate("mem", &DriverParams::new()).await.unwrap();
        registry.shutdown_all().await;
        let found = registry.lookup("mem").unwrap();
        assert!(Arc::ptr_eq(&driver, &found));
        assert!(matches!(
            registry.instantiate("mem", &DriverParams::new()).await,
            Err(VolumeError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn instantiate_after_shutdown_is_refused() {
        let registry = DriverRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register("mem", counting_factory(Arc::clone(&calls))).unwrap();
        registry.shutdown_all().await;

        let err = registry
            .instantiate("mem", &DriverParams::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VolumeError::NotSupported(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.instantiated().is_empty());
    }

    #[test]
    fn global_is_a_single_instance() {
        assert!(std::ptr::eq(DriverRegistry::global(), DriverRegistry::global()));
    }
}

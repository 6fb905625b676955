//! Driver hierarchy, lazy extension loading and once-per-driver setup.
//!
//! Every driver is declared with its parents. A driver has test extensions
//! when it, or one of its ancestors, registered an implementation of
//! [`TestExtensions`]. Implementations are registered by extension modules:
//! loader functions keyed by driver id that the registry calls lazily the
//! first time a driver is resolved. Extensions registered while a module is
//! loading stay staged until the loader returns, so a concurrent resolution
//! never sees a half-loaded module.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::ThreadId;

use tracing::{debug, info, warn};

use crate::error::{DriverError, Result};
use crate::extensions::TestExtensions;
use crate::id::DriverId;

/// Extension module for a driver.
///
/// Loading a module registers extensions through
/// [`DriverRegistry::register_extensions`]. Loaders run under the global load
/// lock and must not resolve drivers themselves.
pub type ExtensionLoader = Arc<dyn Fn(&DriverRegistry) -> Result<()> + Send + Sync>;

/// A node of the driver hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    pub id: DriverId,
    pub parents: Vec<DriverId>,
    /// Structural parents group drivers but are never resolved themselves.
    pub is_abstract: bool,
}

/// Lifecycle position of a driver inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DriverState {
    Unregistered,
    Registered,
    ExtensionsLoading,
    ExtensionsLoaded,
    SetupPending,
    SetupDone,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverState::Unregistered => "unregistered",
            DriverState::Registered => "registered",
            DriverState::ExtensionsLoading => "extensions_loading",
            DriverState::ExtensionsLoaded => "extensions_loaded",
            DriverState::SetupPending => "setup_pending",
            DriverState::SetupDone => "setup_done",
        };
        f.write_str(label)
    }
}

#[derive(Default)]
struct SetupGuard {
    done: AtomicBool,
    lock: Mutex<()>,
}

/// Process-wide registry of drivers and their test extensions.
#[derive(Default)]
pub struct DriverRegistry {
    hierarchy: RwLock<BTreeMap<DriverId, DriverDescriptor>>,
    modules: RwLock<HashMap<DriverId, ExtensionLoader>>,
    extensions: RwLock<HashMap<DriverId, Arc<dyn TestExtensions>>>,
    /// Global module load lock. The set names modules whose last load succeeded.
    loaded_modules: Mutex<HashSet<DriverId>>,
    loading: RwLock<HashSet<DriverId>>,
    /// Thread running a loader; its registrations go to `staged`.
    loader_thread: RwLock<Option<ThreadId>>,
    staged: Mutex<HashMap<DriverId, Arc<dyn TestExtensions>>>,
    setup: RwLock<HashMap<DriverId, Arc<SetupGuard>>>,
    torn_down: Mutex<HashSet<DriverId>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drivers: Vec<DriverId> = read(&self.hierarchy).keys().cloned().collect();
        let mut modules: Vec<DriverId> = read(&self.modules).keys().cloned().collect();
        modules.sort();
        f.debug_struct("DriverRegistry")
            .field("drivers", &drivers)
            .field("modules", &modules)
            .finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a concrete driver with its parents. Parents must already be
    /// declared and a driver is declared once, so the hierarchy stays acyclic.
    pub fn declare<I, P>(&self, id: impl Into<DriverId>, parents: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<DriverId>,
    {
        self.insert_descriptor(id.into(), parents, false)
    }

    /// Declare a structural driver that groups others and is skipped by parent delegation.
    pub fn declare_abstract<I, P>(&self, id: impl Into<DriverId>, parents: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<DriverId>,
    {
        self.insert_descriptor(id.into(), parents, true)
    }

    fn insert_descriptor<I, P>(&self, id: DriverId, parents: I, is_abstract: bool) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<DriverId>,
    {
        let parents: Vec<DriverId> = parents.into_iter().map(Into::into).collect();
        let mut hierarchy = write(&self.hierarchy);
        if hierarchy.contains_key(&id) {
            return Err(DriverError::DuplicateDriver(id));
        }
        if let Some(missing) = parents.iter().find(|parent| !hierarchy.contains_key(*parent)) {
            return Err(DriverError::UnknownDriver(missing.clone()));
        }
        debug!(event = "driver_declared", driver = %id, parents = parents.len(), is_abstract);
        hierarchy.insert(
            id.clone(),
            DriverDescriptor {
                id,
                parents,
                is_abstract,
            },
        );
        Ok(())
    }

    /// Register the extension module that provides extensions for `id`.
    pub fn register_module(
        &self,
        id: impl Into<DriverId>,
        loader: impl Fn(&DriverRegistry) -> Result<()> + Send + Sync + 'static,
    ) {
        let id = id.into();
        debug!(event = "module_registered", driver = %id);
        write(&self.modules).insert(id, Arc::new(loader));
    }

    /// Attach test extensions to `id`, declaring the driver if needed.
    ///
    /// This is the registration side effect of loading an extension module.
    /// Called from inside a loader, the extensions become visible only once
    /// the loader returned successfully.
    pub fn register_extensions(&self, id: impl Into<DriverId>, extensions: Arc<dyn TestExtensions>) {
        let id = id.into();
        write(&self.hierarchy)
            .entry(id.clone())
            .or_insert_with(|| DriverDescriptor {
                id: id.clone(),
                parents: Vec::new(),
                is_abstract: false,
            });
        if *read(&self.loader_thread) == Some(std::thread::current().id()) {
            debug!(event = "extensions_staged", driver = %id);
            lock(&self.staged).insert(id, extensions);
            return;
        }
        info!(event = "extensions_registered", driver = %id);
        write(&self.extensions).insert(id, extensions);
    }

    /// Declared drivers in id order.
    pub fn drivers(&self) -> Vec<DriverDescriptor> {
        read(&self.hierarchy).values().cloned().collect()
    }

    pub fn descriptor(&self, id: &DriverId) -> Option<DriverDescriptor> {
        read(&self.hierarchy).get(id).cloned()
    }

    /// Whether `id` or any of its ancestors has registered extensions. Never loads anything.
    pub fn has_capability(&self, id: &DriverId) -> bool {
        self.nearest_extensions(id).is_some()
    }

    /// Position of `id` in the resolution lifecycle.
    pub fn state(&self, id: &DriverId) -> DriverState {
        if read(&self.loading).contains(id) {
            return DriverState::ExtensionsLoading;
        }
        if let Some(guard) = read(&self.setup).get(id) {
            return if guard.done.load(Ordering::Acquire) {
                DriverState::SetupDone
            } else {
                DriverState::SetupPending
            };
        }
        if self.has_capability(id) {
            return DriverState::ExtensionsLoaded;
        }
        if read(&self.hierarchy).contains_key(id) || read(&self.modules).contains_key(id) {
            DriverState::Registered
        } else {
            DriverState::Unregistered
        }
    }

    /// Make sure `id` has test extensions and its setup ran, then return it.
    ///
    /// Lookup order: the driver's own module, then every non-abstract parent
    /// (failures there are ignored), then a forced reload of the driver's own
    /// module. A driver without a module of its own is a miss; any other
    /// failure of its own module is returned.
    pub fn resolve(&self, id: &DriverId) -> Result<DriverId> {
        if !self.has_capability(id) {
            self.load_own_module(id, false)?;
        }

        if !self.has_capability(id) {
            for parent in self.concrete_parents(id) {
                info!(event = "parent_delegation", driver = %id, parent = %parent);
                if let Err(err) = self.resolve(&parent) {
                    debug!(
                        event = "parent_delegation_failed",
                        driver = %id,
                        parent = %parent,
                        error = %err
                    );
                }
            }
        }

        if !self.has_capability(id) {
            warn!(event = "module_forced_reload", driver = %id);
            self.load_own_module(id, true)?;
        }

        let Some((_, extensions)) = self.nearest_extensions(id) else {
            return Err(DriverError::NoTestExtensions(id.clone()));
        };

        self.run_setup_once(id, extensions.as_ref())?;
        Ok(id.clone())
    }

    /// Driver id to dispatch capability calls on. Resolves as a side effect.
    pub fn dispatch_target(&self, id: &DriverId) -> Result<DriverId> {
        self.resolve(id)
    }

    /// Resolve `id` and return the nearest extensions in its hierarchy.
    pub fn extensions(&self, id: &DriverId) -> Result<Arc<dyn TestExtensions>> {
        let target = self.dispatch_target(id)?;
        self.nearest_extensions(&target)
            .map(|(_, extensions)| extensions)
            .ok_or(DriverError::NoTestExtensions(target))
    }

    /// Run the teardown of every driver in `active` that has extensions and a teardown hook.
    ///
    /// Each driver is torn down at most once per registry. All teardowns are
    /// attempted; the first failure is returned after the rest ran.
    pub fn run_all_teardowns(&self, active: &[DriverId]) -> Result<Vec<DriverId>> {
        let drivers: Vec<DriverId> = read(&self.hierarchy).keys().cloned().collect();
        let mut torn_down = Vec::new();
        let mut first_error = None;

        for id in drivers.into_iter().filter(|id| active.contains(id)) {
            let Some((_, extensions)) = self.nearest_extensions(&id) else {
                continue;
            };
            if !extensions.has_after_run_hook() {
                continue;
            }
            if !lock(&self.torn_down).insert(id.clone()) {
                continue;
            }

            info!(event = "teardown_started", driver = %id);
            match extensions.after_run(&id) {
                Ok(()) => {
                    info!(event = "teardown_finished", driver = %id);
                    torn_down.push(id);
                }
                Err(err) => {
                    warn!(event = "teardown_failed", driver = %id, error = %err);
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(torn_down),
        }
    }

    /// Breadth-first search over `id` and its ancestors for registered extensions.
    fn nearest_extensions(&self, id: &DriverId) -> Option<(DriverId, Arc<dyn TestExtensions>)> {
        let hierarchy = read(&self.hierarchy);
        let extensions = read(&self.extensions);
        let mut queue = VecDeque::from([id.clone()]);
        let mut seen = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(found) = extensions.get(&current) {
                return Some((current, Arc::clone(found)));
            }
            if let Some(descriptor) = hierarchy.get(&current) {
                queue.extend(descriptor.parents.iter().cloned());
            }
        }
        None
    }

    fn concrete_parents(&self, id: &DriverId) -> Vec<DriverId> {
        let hierarchy = read(&self.hierarchy);
        hierarchy
            .get(id)
            .map(|descriptor| {
                descriptor
                    .parents
                    .iter()
                    .filter(|parent| {
                        hierarchy
                            .get(*parent)
                            .is_some_and(|parent| !parent.is_abstract)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn load_own_module(&self, id: &DriverId, reload: bool) -> Result<()> {
        match self.load_module(id, reload) {
            Err(DriverError::ExtensionNotFound(_)) => {
                debug!(event = "module_load_missed", driver = %id, reload);
                Ok(())
            }
            Err(err) => {
                warn!(event = "module_load_failed", driver = %id, reload, error = %err);
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Call the module of `id` under the global load lock.
    ///
    /// Without `reload` a module whose last load succeeded is not called
    /// again. Staged registrations are published when the loader succeeds and
    /// dropped when it fails.
    fn load_module(&self, id: &DriverId, reload: bool) -> Result<()> {
        let loader = read(&self.modules)
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::ExtensionNotFound(id.clone()))?;

        let mut loaded = lock(&self.loaded_modules);
        if !reload && loaded.contains(id) {
            return Ok(());
        }

        info!(event = "module_loading", driver = %id, reload);
        write(&self.loading).insert(id.clone());
        *write(&self.loader_thread) = Some(std::thread::current().id());
        let outcome = loader(self);
        *write(&self.loader_thread) = None;
        let staged = std::mem::take(&mut *lock(&self.staged));
        write(&self.loading).remove(id);

        if let Err(err) = outcome {
            loaded.remove(id);
            return Err(err);
        }

        let mut extensions = write(&self.extensions);
        for (driver, registered) in staged {
            info!(event = "extensions_registered", driver = %driver);
            extensions.insert(driver, registered);
        }
        drop(extensions);

        loaded.insert(id.clone());
        info!(event = "module_loaded", driver = %id);
        Ok(())
    }

    fn run_setup_once(&self, id: &DriverId, extensions: &dyn TestExtensions) -> Result<()> {
        let guard = self.setup_guard(id);
        if guard.done.load(Ordering::Acquire) {
            return Ok(());
        }

        let _held = guard.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.done.load(Ordering::Acquire) {
            return Ok(());
        }

        info!(event = "setup_started", driver = %id);
        extensions.before_run(id).map_err(|err| match err {
            DriverError::Setup { .. } => err,
            other => DriverError::Setup {
                driver: id.clone(),
                reason: other.to_string(),
            },
        })?;
        guard.done.store(true, Ordering::Release);
        info!(event = "setup_finished", driver = %id);
        Ok(())
    }

    fn setup_guard(&self, id: &DriverId) -> Arc<SetupGuard> {
        if let Some(guard) = read(&self.setup).get(id) {
            return Arc::clone(guard);
        }
        Arc::clone(write(&self.setup).entry(id.clone()).or_default())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{ConnectionContext, ConnectionDetails, CreateDatabaseOptions};
    use async_trait::async_trait;
    use tabula_core::DatabaseDefinition;

    #[derive(Debug)]
    struct NoopExtensions;

    #[async_trait]
    impl TestExtensions for NoopExtensions {
        fn connection_details(
            &self,
            _context: ConnectionContext,
            _database: &DatabaseDefinition,
        ) -> Result<ConnectionDetails> {
            Ok(ConnectionDetails::new())
        }

        async fn create_database(
            &self,
            _database: &DatabaseDefinition,
            _options: &CreateDatabaseOptions,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn declaring_with_unknown_parent_fails() {
        let registry = DriverRegistry::new();
        let err = registry.declare("h2", ["sql"]).unwrap_err();
        assert!(matches!(err, DriverError::UnknownDriver(ref id) if id.as_str() == "sql"));
    }

    #[test]
    fn state_starts_unregistered_then_registered() {
        let registry = DriverRegistry::new();
        let id = DriverId::from("mongo");
        assert_eq!(registry.state(&id), DriverState::Unregistered);
        registry.declare("mongo", Vec::<DriverId>::new()).expect("declare");
        assert_eq!(registry.state(&id), DriverState::Registered);
        assert!(!registry.has_capability(&id));
    }

    #[test]
    fn redeclaring_a_driver_is_rejected() {
        let registry = DriverRegistry::new();
        registry.declare("postgres", Vec::<DriverId>::new()).expect("declare");
        registry.declare("redshift", ["postgres"]).expect("declare");

        let err = registry.declare("postgres", ["redshift"]).unwrap_err();
        assert!(matches!(err, DriverError::DuplicateDriver(ref id) if id.as_str() == "postgres"));
        let postgres = registry.descriptor(&DriverId::from("postgres")).expect("descriptor");
        assert!(postgres.parents.is_empty());
    }

    #[test]
    fn failed_module_load_publishes_nothing() {
        let registry = DriverRegistry::new();
        let id = DriverId::from("druid");
        registry.register_module("druid", |registry| {
            registry.register_extensions("druid", Arc::new(NoopExtensions));
            Err(DriverError::Unsupported("druid module failed".to_string()))
        });

        assert!(registry.load_module(&id, false).is_err());
        assert!(!registry.has_capability(&id));
        assert!(lock(&registry.staged).is_empty());
        assert!(!lock(&registry.loaded_modules).contains(&id));
    }

    #[test]
    fn missing_module_is_a_lookup_miss() {
        let registry = DriverRegistry::new();
        let id = DriverId::from("druid");
        assert!(matches!(
            registry.load_module(&id, false),
            Err(DriverError::ExtensionNotFound(_))
        ));
    }
}

//! Registry mapping (resource kind, pool name) to one shared pool

use crate::config::PoolSettings;
use crate::errors::{PoolError, PoolResult};
use crate::events::{EventSink, TracingSink};
use crate::metrics::PoolMetrics;
use crate::pool::ObjectPool;
use crate::resource::PooledResource;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Identity of a registered pool: the resource type plus a logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    kind: TypeId,
    kind_name: &'static str,
    name: String,
}

impl PoolKey {
    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            kind: TypeId::of::<T>(),
            kind_name: std::any::type_name::<T>(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the pooled resource
    pub fn kind_name(&self) -> &'static str {
        self.kind_name
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind_name, self.name)
    }
}

/// Type-erased view of a pool, used for registry-wide operations
pub trait ManagedPool: Send + Sync {
    fn name(&self) -> &str;

    /// Blocking metrics snapshot
    fn metrics(&self) -> PoolMetrics;

    /// Metrics snapshot that gives up after `timeout`
    fn try_metrics(&self, timeout: Duration) -> PoolResult<PoolMetrics>;

    /// Drop every resource; returns how many were dropped
    fn clear(&self) -> usize;
}

impl<T: PooledResource> ManagedPool for ObjectPool<T> {
    fn name(&self) -> &str {
        ObjectPool::name(self)
    }

    fn metrics(&self) -> PoolMetrics {
        ObjectPool::metrics(self)
    }

    fn try_metrics(&self, timeout: Duration) -> PoolResult<PoolMetrics> {
        ObjectPool::try_metrics(self, timeout)
    }

    fn clear(&self) -> usize {
        ObjectPool::clear(self)
    }
}

struct Registered {
    typed: Arc<dyn Any + Send + Sync>,
    managed: Arc<dyn ManagedPool>,
}

impl Registered {
    fn new<T: PooledResource>(pool: Arc<ObjectPool<T>>) -> Self {
        Self {
            typed: pool.clone(),
            managed: pool,
        }
    }

    fn downcast<T: PooledResource>(&self, key: &PoolKey) -> PoolResult<Arc<ObjectPool<T>>> {
        Arc::clone(&self.typed)
            .downcast::<ObjectPool<T>>()
            .map_err(|_| PoolError::KindMismatch {
                name: key.name.clone(),
            })
    }
}

/// Shared map from resource kind and pool name to a single pool.
///
/// Construct one at application start and pass it (usually as an
/// `Arc<PoolRegistry>`) to whatever spawns pooled resources.
///
/// The first registration of a key wins: a later `get_or_create` for the
/// same kind and name returns the existing pool and ignores its factory and
/// settings. Use [`recreate`](Self::recreate) to replace a pool on purpose.
///
/// # Examples
///
/// ```
/// use warmpool::{PoolRegistry, PoolSettings, PooledResource};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Enemy;
///
/// impl PooledResource for Enemy {
///     fn on_acquire(&mut self) {}
///     fn on_release(&mut self) {}
/// }
///
/// let registry = PoolRegistry::new();
/// let settings = PoolSettings::new("Default").with_initial_size(4).with_max_size(8);
///
/// let first = registry.get_or_create(settings.clone(), Enemy::default).unwrap();
/// let second = registry.get_or_create(settings.with_max_size(64), Enemy::default).unwrap();
///
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(second.max_size(), 8);
/// ```
pub struct PoolRegistry {
    pools: DashMap<PoolKey, Registered>,
    sink: Arc<dyn EventSink>,
}

impl PoolRegistry {
    /// Create an empty registry whose pools report through `tracing`
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Create an empty registry; every pool it creates reports to `sink`
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            pools: DashMap::new(),
            sink,
        }
    }

    /// Return the pool registered for `T` under `settings.name`, creating
    /// it from `factory` and `settings` if absent.
    ///
    /// Creation happens while the map entry is held, so concurrent callers
    /// registering the same key observe a single pool. The factory must not
    /// call back into this registry.
    pub fn get_or_create<T, F>(&self, settings: PoolSettings, factory: F) -> PoolResult<Arc<ObjectPool<T>>>
    where
        T: PooledResource,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = PoolKey::of::<T>(settings.name.clone());
        match self.pools.entry(key) {
            Entry::Occupied(entry) => {
                let pool = entry.get().downcast::<T>(entry.key())?;
                if pool.settings() != &settings {
                    debug!(pool = %entry.key(), "Pool already registered, ignoring new settings");
                }
                Ok(pool)
            }
            Entry::Vacant(entry) => {
                let pool = Arc::new(ObjectPool::with_sink(factory, settings, Arc::clone(&self.sink))?);
                debug!(pool = %entry.key(), "Registered pool");
                entry.insert(Registered::new(Arc::clone(&pool)));
                Ok(pool)
            }
        }
    }

    /// Look up an existing pool without creating one
    pub fn get<T: PooledResource>(&self, name: &str) -> Option<Arc<ObjectPool<T>>> {
        let key = PoolKey::of::<T>(name);
        self.pools
            .get(&key)
            .and_then(|entry| entry.downcast::<T>(&key).ok())
    }

    /// Like [`get`](Self::get) but reports a missing pool as an error
    pub fn require<T: PooledResource>(&self, name: &str) -> PoolResult<Arc<ObjectPool<T>>> {
        let key = PoolKey::of::<T>(name);
        match self.pools.get(&key) {
            Some(entry) => entry.downcast::<T>(&key),
            None => Err(PoolError::PoolNotFound {
                kind: key.kind_name,
                name: key.name,
            }),
        }
    }

    /// Whether a pool of kind `T` is registered under `name`
    pub fn contains<T: PooledResource>(&self, name: &str) -> bool {
        self.pools.contains_key(&PoolKey::of::<T>(name))
    }

    /// Replace any pool registered for `T` under `settings.name`.
    ///
    /// The replaced pool is cleared. Handles acquired from it are no longer
    /// accepted by either pool.
    pub fn recreate<T, F>(&self, settings: PoolSettings, factory: F) -> PoolResult<Arc<ObjectPool<T>>>
    where
        T: PooledResource,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = PoolKey::of::<T>(settings.name.clone());
        let pool = Arc::new(ObjectPool::with_sink(factory, settings, Arc::clone(&self.sink))?);
        let replaced = self.pools.insert(key.clone(), Registered::new(Arc::clone(&pool)));
        if let Some(old) = replaced {
            debug!(pool = %key, "Recreated pool");
            old.managed.clear();
        }
        Ok(pool)
    }

    /// Clear and unregister a pool. Returns whether it was registered.
    pub fn remove<T: PooledResource>(&self, name: &str) -> bool {
        match self.pools.remove(&PoolKey::of::<T>(name)) {
            Some((key, old)) => {
                old.managed.clear();
                debug!(pool = %key, "Removed pool");
                true
            }
            None => false,
        }
    }

    /// Clear every registered pool, keeping the registrations.
    ///
    /// Returns the total number of resources dropped.
    pub fn clear_all(&self) -> usize {
        self.managed_pools()
            .into_iter()
            .map(|(_, pool)| pool.clear())
            .sum()
    }

    /// Every registered pool, detached from the map's locks
    pub fn managed_pools(&self) -> Vec<(PoolKey, Arc<dyn ManagedPool>)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().managed)))
            .collect()
    }

    /// Metrics for every registered pool, ordered by pool name
    pub fn snapshot(&self) -> Vec<PoolMetrics> {
        let mut metrics: Vec<PoolMetrics> = self
            .managed_pools()
            .into_iter()
            .map(|(_, pool)| pool.metrics())
            .collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.kind.cmp(&b.kind)));
        metrics
    }

    /// Registered pool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|entry| entry.key().name.clone()).collect();
        names.sort();
        names
    }

    /// Get registered pool count
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pools are registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.names())
            .finish()
    }
}

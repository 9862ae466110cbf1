//! The pooled resource contract and the handles callers hold

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle hooks a type implements to be managed by an [`ObjectPool`](crate::ObjectPool).
///
/// Hooks run after the pool has dropped its internal lock, while the
/// resource is counted as outstanding. A hook that blocks on the resource
/// stalls only the caller that triggered it.
///
/// # Examples
///
/// ```
/// use warmpool::PooledResource;
///
/// #[derive(Default)]
/// struct Projectile {
///     position: (f32, f32),
///     visible: bool,
/// }
///
/// impl PooledResource for Projectile {
///     fn on_acquire(&mut self) {
///         self.visible = true;
///     }
///
///     fn on_release(&mut self) {
///         self.position = (0.0, 0.0);
///         self.visible = false;
///     }
/// }
/// ```
pub trait PooledResource: Send + 'static {
    /// Called when the resource is handed out by `acquire()`
    fn on_acquire(&mut self);

    /// Called when the resource is handed back by `release()`
    fn on_release(&mut self);

    /// Called once when `clear()` drops the resource from its pool
    fn on_destroy(&mut self) {}
}

/// Identity of a resource within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of a pool instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A resource checked out of a pool.
///
/// Cloning the handle does not clone the resource; both handles refer to the
/// same instance. Hand it back with [`ObjectPool::release`](crate::ObjectPool::release).
pub struct Pooled<T> {
    id: ResourceId,
    pool: PoolId,
    generation: u64,
    cell: Arc<Mutex<T>>,
}

impl<T> Pooled<T> {
    pub(crate) fn new(id: ResourceId, pool: PoolId, generation: u64, value: T) -> Self {
        Self {
            id,
            pool,
            generation,
            cell: Arc::new(Mutex::new(value)),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Lock the resource for reading or mutation.
    ///
    /// Drop the guard before releasing the handle; release runs `on_release`
    /// on the same lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.cell.lock()
    }

    /// Whether two handles refer to the same resource instance
    pub fn same_resource(&self, other: &Pooled<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for Pooled<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            pool: self.pool,
            generation: self.generation,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("generation", &self.generation)
            .finish()
    }
}

//! Bounded object pool with eager warm-up and on-demand growth

use crate::config::{PeakPolicy, PoolSettings};
use crate::errors::{PoolError, PoolResult};
use crate::events::{EventSink, PoolEvent, TracingSink};
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::resource::{PoolId, Pooled, PooledResource, ResourceId};

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Mutable pool state, guarded by a single lock per pool
struct PoolState<T> {
    idle: Vec<Pooled<T>>,
    outstanding: HashMap<ResourceId, Pooled<T>>,
    /// Resources between sets while their hook runs outside the lock
    in_transition: usize,
    peak_outstanding: usize,
    next_resource: u64,
    /// Bumped by `clear()`; handles from an earlier generation are foreign
    generation: u64,
}

impl<T> PoolState<T> {
    fn total(&self) -> usize {
        self.idle.len() + self.checked_out()
    }

    /// Outstanding resources, counting those whose hooks are still running
    fn checked_out(&self) -> usize {
        self.outstanding.len() + self.in_transition
    }

    fn construct(&mut self, pool: PoolId, value: T) -> Pooled<T> {
        let id = ResourceId::new(self.next_resource);
        self.next_resource += 1;
        Pooled::new(id, pool, self.generation, value)
    }

    fn begin_transition(&mut self) {
        self.in_transition += 1;
        self.peak_outstanding = self.peak_outstanding.max(self.checked_out());
    }
}

/// Bounded pool of warm resources of a single type.
///
/// Growth is one resource per `acquire()` call and never exceeds
/// `max_size`. When every resource is outstanding, `acquire()` returns
/// `None` and the caller is expected to skip whatever it wanted to spawn.
///
/// # Examples
///
/// ```
/// use warmpool::{ObjectPool, PoolSettings, PooledResource};
///
/// #[derive(Default)]
/// struct Enemy {
///     alive: bool,
/// }
///
/// impl PooledResource for Enemy {
///     fn on_acquire(&mut self) { self.alive = true; }
///     fn on_release(&mut self) { self.alive = false; }
/// }
///
/// let settings = PoolSettings::new("enemies").with_initial_size(2).with_max_size(3);
/// let pool = ObjectPool::new(Enemy::default, settings).unwrap();
///
/// let enemy = pool.acquire().unwrap();
/// assert!(enemy.lock().alive);
///
/// pool.release(enemy).unwrap();
/// assert_eq!(pool.current_count(), 2);
/// ```
pub struct ObjectPool<T: PooledResource> {
    id: PoolId,
    settings: PoolSettings,
    factory: Factory<T>,
    state: Mutex<PoolState<T>>,
    metrics: MetricsTracker,
    sink: Arc<dyn EventSink>,
}

impl<T: PooledResource> ObjectPool<T> {
    /// Create a pool that reports events through `tracing`
    pub fn new<F>(factory: F, settings: PoolSettings) -> PoolResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_sink(factory, settings, Arc::new(TracingSink))
    }

    /// Create a pool that reports events to the given sink.
    ///
    /// Invokes the factory `initial_size` times before returning. Fails
    /// without constructing anything if the settings are invalid.
    pub fn with_sink<F>(factory: F, settings: PoolSettings, sink: Arc<dyn EventSink>) -> PoolResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        settings.validate()?;

        let id = PoolId::next();
        let mut state = PoolState {
            idle: Vec::with_capacity(settings.initial_size),
            outstanding: HashMap::new(),
            in_transition: 0,
            peak_outstanding: 0,
            next_resource: 0,
            generation: 0,
        };
        for _ in 0..settings.initial_size {
            let resource = state.construct(id, factory());
            state.idle.push(resource);
        }

        debug!(
            pool = %settings.name,
            kind = std::any::type_name::<T>(),
            initial_size = settings.initial_size,
            max_size = settings.max_size,
            "Created object pool"
        );

        Ok(Self {
            id,
            settings,
            factory: Box::new(factory),
            state: Mutex::new(state),
            metrics: MetricsTracker::new(),
            sink,
        })
    }

    /// Take a resource from the pool, constructing one if the idle set is
    /// empty and the pool is below `max_size`.
    ///
    /// Returns `None` when the pool is exhausted. `on_acquire()` runs after
    /// the pool lock is dropped, so a hook that blocks only stalls its caller.
    pub fn acquire(&self) -> Option<Pooled<T>> {
        let (claimed, event) = {
            let mut state = self.state.lock();
            if let Some(resource) = state.idle.pop() {
                state.begin_transition();
                (Some(resource), None)
            } else if state.total() < self.settings.max_size {
                let value = (self.factory)();
                let resource = state.construct(self.id, value);
                state.begin_transition();
                let event = PoolEvent::Expanded {
                    name: self.settings.name.clone(),
                    new_total: state.total(),
                    max: self.settings.max_size,
                };
                (Some(resource), Some(event))
            } else {
                let event = PoolEvent::Exhausted {
                    name: self.settings.name.clone(),
                    max: self.settings.max_size,
                };
                (None, Some(event))
            }
        };

        match (&claimed, &event) {
            (Some(_), Some(_)) => {
                MetricsTracker::record(&self.metrics.total_acquired);
                MetricsTracker::record(&self.metrics.expansions);
            }
            (Some(_), None) => MetricsTracker::record(&self.metrics.total_acquired),
            (None, _) => MetricsTracker::record(&self.metrics.exhaustions),
        }
        if let Some(event) = event {
            self.sink.emit(&event);
        }

        let resource = claimed?;
        resource.lock().on_acquire();
        self.finish_transition(&resource, |state, resource| {
            state.outstanding.insert(resource.id(), resource.clone());
        });
        Some(resource)
    }

    /// Hand a resource back to the pool.
    ///
    /// Releasing a resource that is already idle, that belongs to another
    /// pool, or that was dropped by `clear()` is rejected with an error and
    /// reported to the event sink. Counters are left untouched in that case.
    /// `on_release()` runs after the pool lock is dropped, and the resource
    /// becomes idle once it returns.
    pub fn release(&self, resource: Pooled<T>) -> PoolResult<()> {
        self.check_in(resource, false)
    }

    /// Shared release path. With `skip_reclaimed`, a handle that `clear()`
    /// already took back is dropped quietly instead of reported as foreign.
    fn check_in(&self, resource: Pooled<T>, skip_reclaimed: bool) -> PoolResult<()> {
        let claimed = {
            let mut state = self.state.lock();
            if resource.pool_id() != self.id {
                Err(self.foreign(&resource))
            } else if resource.generation() != state.generation {
                if skip_reclaimed {
                    return Ok(());
                }
                Err(self.foreign(&resource))
            } else {
                match state.outstanding.remove(&resource.id()) {
                    Some(tracked) => {
                        state.begin_transition();
                        Ok(tracked)
                    }
                    None => Err(PoolError::DoubleRelease {
                        pool: self.settings.name.clone(),
                        id: resource.id(),
                    }),
                }
            }
        };

        let outcome = claimed.map(|tracked| {
            tracked.lock().on_release();
            self.finish_transition(&tracked, |state, tracked| state.idle.push(tracked.clone()));
        });

        match &outcome {
            Ok(()) => MetricsTracker::record(&self.metrics.total_released),
            Err(err) => {
                MetricsTracker::record(&self.metrics.protocol_violations);
                let name = self.settings.name.clone();
                let event = match err {
                    PoolError::DoubleRelease { .. } => PoolEvent::DoubleReleaseDetected { name },
                    _ => PoolEvent::ForeignReleaseDetected { name },
                };
                self.sink.emit(&event);
            }
        }
        outcome
    }

    /// Settle a resource whose hook ran outside the lock. If `clear()` bumped
    /// the generation meanwhile, the resource is destroyed instead of placed.
    fn finish_transition<F>(&self, resource: &Pooled<T>, place: F)
    where
        F: FnOnce(&mut PoolState<T>, &Pooled<T>),
    {
        let reclaimed = {
            let mut state = self.state.lock();
            state.in_transition -= 1;
            if resource.generation() == state.generation {
                place(&mut *state, resource);
                false
            } else {
                true
            }
        };
        if reclaimed {
            resource.lock().on_destroy();
        }
    }

    /// Acquire a resource that returns itself to the pool when dropped
    pub fn lease(self: &Arc<Self>) -> Option<Lease<T>> {
        self.acquire().map(|resource| Lease {
            resource: Some(resource),
            pool: Arc::clone(self),
        })
    }

    /// Drop every resource the pool owns, idle and outstanding.
    ///
    /// Each dropped resource gets `on_destroy()`. Outstanding handles stay
    /// valid memory for their holders but are no longer accepted by
    /// `release()`. The pool is not re-warmed; call [`warm`](Self::warm) for
    /// that. Returns the number of resources dropped.
    pub fn clear(&self) -> usize {
        let drained = {
            let mut state = self.state.lock();
            let mut drained: Vec<Pooled<T>> = state.idle.drain(..).collect();
            drained.extend(state.outstanding.drain().map(|(_, resource)| resource));
            state.generation += 1;
            if self.settings.peak_policy == PeakPolicy::ResetOnClear {
                state.peak_outstanding = state.in_transition;
            }
            drained
        };

        for resource in &drained {
            resource.lock().on_destroy();
        }

        let destroyed = drained.len();
        self.sink.emit(&PoolEvent::Cleared {
            name: self.settings.name.clone(),
            destroyed,
        });
        destroyed
    }

    /// Construct up to `count` idle resources without exceeding `max_size`.
    ///
    /// Returns how many were built.
    pub fn warm(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let room = self.settings.max_size.saturating_sub(state.total());
        let built = count.min(room);
        for _ in 0..built {
            let resource = state.construct(self.id, (self.factory)());
            state.idle.push(resource);
        }
        debug!(pool = %self.settings.name, built = built, total = state.total(), "Warmed object pool");
        built
    }

    /// Reset the peak outstanding count to the current outstanding count
    pub fn reset_peak(&self) {
        let mut state = self.state.lock();
        state.peak_outstanding = state.checked_out();
    }

    /// Whether this pool owns the resource, idle or outstanding
    pub fn contains(&self, resource: &Pooled<T>) -> bool {
        let state = self.state.lock();
        resource.pool_id() == self.id
            && resource.generation() == state.generation
            && resource.id().get() < state.next_resource
    }

    /// Whether the resource is currently checked out of this pool
    pub fn is_outstanding(&self, resource: &Pooled<T>) -> bool {
        let state = self.state.lock();
        resource.pool_id() == self.id
            && resource.generation() == state.generation
            && state.outstanding.contains_key(&resource.id())
    }

    /// Get pool id
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Get pool name
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Get pool settings
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Idle resources ready for reuse
    pub fn current_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Resources checked out and not yet released
    pub fn outstanding_count(&self) -> usize {
        self.state.lock().checked_out()
    }

    /// Resources the pool owns, idle or outstanding
    pub fn total_count(&self) -> usize {
        self.state.lock().total()
    }

    /// Highest outstanding count observed
    pub fn peak_count(&self) -> usize {
        self.state.lock().peak_outstanding
    }

    /// Get max pool size
    pub fn max_size(&self) -> usize {
        self.settings.max_size
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.state.lock();
        self.snapshot_from(state)
    }

    /// Get pool metrics, giving up if the pool lock is held longer than `timeout`
    pub fn try_metrics(&self, timeout: Duration) -> PoolResult<PoolMetrics> {
        match self.state.try_lock_for(timeout) {
            Some(state) => Ok(self.snapshot_from(state)),
            None => Err(PoolError::Busy {
                pool: self.settings.name.clone(),
            }),
        }
    }

    fn snapshot_from(&self, state: MutexGuard<'_, PoolState<T>>) -> PoolMetrics {
        let outstanding = state.checked_out();
        let mut metrics = PoolMetrics {
            name: self.settings.name.clone(),
            kind: std::any::type_name::<T>().to_string(),
            current_count: state.idle.len(),
            outstanding_count: outstanding,
            total_count: state.total(),
            peak_count: state.peak_outstanding,
            initial_size: self.settings.initial_size,
            max_size: self.settings.max_size,
            utilization: PoolMetrics::utilization_of(outstanding, self.settings.max_size),
            total_acquired: 0,
            total_released: 0,
            expansions: 0,
            exhaustions: 0,
            protocol_violations: 0,
        };
        drop(state);
        self.metrics.fill(&mut metrics);
        metrics
    }

    fn foreign(&self, resource: &Pooled<T>) -> PoolError {
        PoolError::ForeignResource {
            pool: self.settings.name.clone(),
            id: resource.id(),
        }
    }
}

impl<T: PooledResource> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectPool")
            .field("name", &self.settings.name)
            .field("idle", &state.idle.len())
            .field("outstanding", &state.checked_out())
            .field("peak", &state.peak_outstanding)
            .field("max_size", &self.settings.max_size)
            .finish()
    }
}

/// A pooled resource that automatically returns to the pool when dropped
pub struct Lease<T: PooledResource> {
    resource: Option<Pooled<T>>,
    pool: Arc<ObjectPool<T>>,
}

impl<T: PooledResource> Lease<T> {
    /// Keep the resource checked out and return the plain handle
    pub fn detach(mut self) -> Pooled<T> {
        self.resource.take().expect("Resource already taken")
    }
}

impl<T: PooledResource> Deref for Lease<T> {
    type Target = Pooled<T>;

    fn deref(&self) -> &Self::Target {
        self.resource.as_ref().expect("Resource already taken")
    }
}

impl<T: PooledResource> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            // Violations are already reported to the pool's sink
            let _ = self.pool.check_in(resource, true);
        }
    }
}

impl<T: PooledResource> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("resource", &self.resource)
            .field("pool", &self.pool.name())
            .finish()
    }
}

//! # warmpool
//!
//! Bounded, lifecycle-aware object pools for real-time simulation loops
//! that spawn and retire many short-lived entities per frame.
//!
//! ## Features
//!
//! - Eager warm-up of `initial_size` resources, one-at-a-time growth up to `max_size`
//! - Exhaustion returned as `None`, never a panic
//! - Double-release and foreign-release detection
//! - Peak, outstanding and lifetime counters per pool
//! - Registry keyed by resource type and pool name, first registration wins
//! - Monitor raising warning/critical/emergency events on rising edges
//! - Structured events through `tracing` or a crossbeam channel
//! - Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use warmpool::{PoolRegistry, PoolSettings, PooledResource};
//!
//! #[derive(Default)]
//! struct Enemy {
//!     health: u32,
//! }
//!
//! impl PooledResource for Enemy {
//!     fn on_acquire(&mut self) {
//!         self.health = 100;
//!     }
//!
//!     fn on_release(&mut self) {
//!         self.health = 0;
//!     }
//! }
//!
//! let registry = PoolRegistry::new();
//! let enemies = registry
//!     .get_or_create(PoolSettings::new("Default").with_initial_size(50).with_max_size(120), Enemy::default)
//!     .unwrap();
//!
//! if let Some(enemy) = enemies.acquire() {
//!     assert_eq!(enemy.lock().health, 100);
//!     enemies.release(enemy).unwrap();
//! }
//! ```

mod config;
mod errors;
mod events;
mod metrics;
mod monitor;
mod pool;
mod registry;
mod resource;

pub use config::{MonitorConfig, PeakPolicy, PoolSettings};
pub use errors::{PoolError, PoolResult};
pub use events::{ChannelSink, EventSink, PoolEvent, TracingSink};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use monitor::{MonitorReport, PoolMonitor, PoolSample, ThresholdLevel};
pub use pool::{Lease, ObjectPool};
pub use registry::{ManagedPool, PoolKey, PoolRegistry};
pub use resource::{PoolId, Pooled, PooledResource, ResourceId};

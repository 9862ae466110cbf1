//! Periodic, read-only observation of every registered pool

use crate::config::MonitorConfig;
use crate::errors::PoolResult;
use crate::events::{EventSink, PoolEvent, TracingSink};
use crate::metrics::PoolMetrics;
use crate::registry::{PoolKey, PoolRegistry};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// How long a sample waits for a busy pool before skipping it
const SNAPSHOT_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Utilization band a pool is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThresholdLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    /// Every resource up to `max_size` is outstanding
    Emergency,
}

impl ThresholdLevel {
    /// Classify a utilization ratio against the configured thresholds
    pub fn classify(utilization: f64, config: &MonitorConfig) -> Self {
        if utilization >= 1.0 {
            ThresholdLevel::Emergency
        } else if utilization >= config.critical_ratio {
            ThresholdLevel::Critical
        } else if utilization >= config.warning_ratio {
            ThresholdLevel::Warning
        } else {
            ThresholdLevel::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdLevel::Normal => "normal",
            ThresholdLevel::Warning => "warning",
            ThresholdLevel::Critical => "critical",
            ThresholdLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for ThresholdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pool's reading from a sampling pass
#[derive(Debug, Clone)]
pub struct PoolSample {
    pub key: PoolKey,
    pub metrics: PoolMetrics,
    pub level: ThresholdLevel,
    /// Resources constructed since the previous sample
    pub grew_by: usize,
}

/// Result of one sampling pass
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub samples: Vec<PoolSample>,
    /// Threshold events emitted by this pass
    pub events: Vec<PoolEvent>,
    /// Pools that could not be read and were skipped
    pub skipped: Vec<PoolKey>,
}

impl MonitorReport {
    pub fn total_outstanding(&self) -> usize {
        self.samples.iter().map(|s| s.metrics.outstanding_count).sum()
    }

    pub fn total_idle(&self) -> usize {
        self.samples.iter().map(|s| s.metrics.current_count).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.samples.iter().map(|s| s.metrics.max_size).sum()
    }

    /// Outstanding resources across all pools over their combined capacity
    pub fn overall_utilization(&self) -> f64 {
        PoolMetrics::utilization_of(self.total_outstanding(), self.total_capacity())
    }

    /// Highest level any pool is in
    pub fn worst_level(&self) -> ThresholdLevel {
        self.samples
            .iter()
            .map(|s| s.level)
            .max()
            .unwrap_or_default()
    }

    pub fn sample_for(&self, name: &str) -> Option<&PoolSample> {
        self.samples.iter().find(|s| s.key.name() == name)
    }
}

#[derive(Debug, Clone, Copy)]
struct PreviousSample {
    level: ThresholdLevel,
    total: usize,
}

/// Samples every pool in a registry and raises threshold events on rising
/// edges only.
///
/// A pool that stays above a threshold produces one event; it must drop to
/// a lower level and rise again to produce another.
///
/// # Examples
///
/// ```
/// use warmpool::{MonitorConfig, PoolMonitor, PoolRegistry, PoolSettings, PooledResource, ThresholdLevel};
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
/// let registry = Arc::new(PoolRegistry::new());
/// let pool = registry
///     .get_or_create(PoolSettings::new("enemies").with_max_size(4), Enemy::default)
///     .unwrap();
/// let monitor = PoolMonitor::new(Arc::clone(&registry), MonitorConfig::default()).unwrap();
///
/// let _held: Vec<_> = (0..4).filter_map(|_| pool.acquire()).collect();
/// let report = monitor.sample();
/// assert_eq!(report.worst_level(), ThresholdLevel::Emergency);
/// assert_eq!(report.events.len(), 1);
///
/// // Still saturated: no new event
/// assert!(monitor.sample().events.is_empty());
/// ```
pub struct PoolMonitor {
    registry: Arc<PoolRegistry>,
    config: MonitorConfig,
    sink: Arc<dyn EventSink>,
    previous: Mutex<HashMap<PoolKey, PreviousSample>>,
    since_last_sample: Mutex<Duration>,
}

impl PoolMonitor {
    /// Create a monitor that reports through `tracing`
    pub fn new(registry: Arc<PoolRegistry>, config: MonitorConfig) -> PoolResult<Self> {
        Self::with_sink(registry, config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        registry: Arc<PoolRegistry>,
        config: MonitorConfig,
        sink: Arc<dyn EventSink>,
    ) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            sink,
            previous: Mutex::new(HashMap::new()),
            since_last_sample: Mutex::new(Duration::ZERO),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Read every registered pool once.
    ///
    /// Pools that cannot be read are logged and skipped. Events are emitted
    /// after all pool locks have been released.
    pub fn sample(&self) -> MonitorReport {
        let mut report = MonitorReport::default();
        let pools = self.registry.managed_pools();

        {
            let mut previous = self.previous.lock();
            let mut seen = HashSet::with_capacity(pools.len());

            for (key, pool) in pools {
                let metrics = match pool.try_metrics(SNAPSHOT_LOCK_TIMEOUT) {
                    Ok(metrics) => metrics,
                    Err(err) => {
                        warn!(pool = %key, error = %err, "Skipping pool during sample");
                        report.skipped.push(key);
                        continue;
                    }
                };

                let level = ThresholdLevel::classify(metrics.utilization, &self.config);
                let before = previous.get(&key).copied().unwrap_or(PreviousSample {
                    level: ThresholdLevel::Normal,
                    total: metrics.total_count,
                });

                if level > before.level {
                    report.events.push(PoolEvent::ThresholdCrossed {
                        name: metrics.name.clone(),
                        level,
                        utilization: metrics.utilization,
                    });
                } else if level < before.level {
                    debug!(pool = %key, from = %before.level, to = %level, "Pool utilization recovered");
                }

                let grew_by = metrics.total_count.saturating_sub(before.total);
                if grew_by > 0 {
                    debug!(pool = %key, grew_by = grew_by, total = metrics.total_count, "Pool grew since last sample");
                }

                previous.insert(
                    key.clone(),
                    PreviousSample {
                        level,
                        total: metrics.total_count,
                    },
                );
                seen.insert(key.clone());
                report.samples.push(PoolSample {
                    key,
                    metrics,
                    level,
                    grew_by,
                });
            }

            // Forget pools that were removed; skipped ones keep their last state
            previous.retain(|key, _| seen.contains(key) || report.skipped.contains(key));
        }

        for event in &report.events {
            self.sink.emit(event);
        }

        debug!(
            pools = report.samples.len(),
            skipped = report.skipped.len(),
            utilization = report.overall_utilization(),
            "Pool monitor sample complete"
        );
        report
    }

    /// Advance the monitor by one host frame.
    ///
    /// Samples once the accumulated time reaches the configured interval.
    /// Long frames never trigger more than one sample.
    pub fn tick(&self, delta: Duration) -> Option<MonitorReport> {
        let interval = self.config.sample_interval();
        {
            let mut elapsed = self.since_last_sample.lock();
            *elapsed += delta;
            if *elapsed < interval {
                return None;
            }
            let carry = *elapsed - interval;
            *elapsed = if carry >= interval { Duration::ZERO } else { carry };
        }
        Some(self.sample())
    }

    /// Run `sample()` on a tokio interval until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sample_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.sample();
            }
        })
    }
}

impl fmt::Debug for PoolMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolMonitor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use crate::events::ChannelSink;
    use crate::pool::ObjectPool;
    use crate::resource::PooledResource;

    #[derive(Debug, Default)]
    struct Enemy;

    impl PooledResource for Enemy {
        fn on_acquire(&mut self) {}
        fn on_release(&mut self) {}
    }

    fn setup(max: usize) -> (Arc<PoolRegistry>, Arc<ObjectPool<Enemy>>) {
        let registry = Arc::new(PoolRegistry::new());
        let pool = registry
            .get_or_create(PoolSettings::new("enemies").with_max_size(max), Enemy::default)
            .unwrap();
        (registry, pool)
    }

    fn config() -> MonitorConfig {
        MonitorConfig::new()
            .with_sample_interval(Duration::from_secs(1))
            .with_thresholds(0.5, 0.8)
    }

    #[test]
    fn test_classify() {
        let config = config();
        assert_eq!(ThresholdLevel::classify(0.1, &config), ThresholdLevel::Normal);
        assert_eq!(ThresholdLevel::classify(0.5, &config), ThresholdLevel::Warning);
        assert_eq!(ThresholdLevel::classify(0.8, &config), ThresholdLevel::Critical);
        assert_eq!(ThresholdLevel::classify(1.0, &config), ThresholdLevel::Emergency);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (registry, _) = setup(4);
        let bad = MonitorConfig::new().with_thresholds(0.9, 0.1);
        assert!(PoolMonitor::new(registry, bad).is_err());
    }

    #[test]
    fn test_rising_edge_only() {
        let (registry, pool) = setup(10);
        let (sink, events) = ChannelSink::unbounded();
        let monitor = PoolMonitor::with_sink(registry, config(), Arc::new(sink)).unwrap();

        let mut held: Vec<_> = (0..6).filter_map(|_| pool.acquire()).collect();
        let report = monitor.sample();
        assert_eq!(report.events.len(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            PoolEvent::ThresholdCrossed { level: ThresholdLevel::Warning, .. }
        ));

        // Steady state above threshold
        assert!(monitor.sample().events.is_empty());
        assert!(events.try_recv().is_err());

        // Drop below, then rise again
        for resource in held.drain(..) {
            pool.release(resource).unwrap();
        }
        assert!(monitor.sample().events.is_empty());

        let _held: Vec<_> = (0..6).filter_map(|_| pool.acquire()).collect();
        assert_eq!(monitor.sample().events.len(), 1);
    }

    #[test]
    fn test_escalation_emits_each_new_level() {
        let (registry, pool) = setup(10);
        let monitor = PoolMonitor::new(registry, config()).unwrap();

        let mut held: Vec<_> = (0..5).filter_map(|_| pool.acquire()).collect();
        assert_eq!(monitor.sample().worst_level(), ThresholdLevel::Warning);

        held.extend((0..3).filter_map(|_| pool.acquire()));
        let report = monitor.sample();
        assert!(matches!(
            report.events.as_slice(),
            [PoolEvent::ThresholdCrossed { level: ThresholdLevel::Critical, .. }]
        ));

        held.extend((0..2).filter_map(|_| pool.acquire()));
        let report = monitor.sample();
        assert!(matches!(
            report.events.as_slice(),
            [PoolEvent::ThresholdCrossed { level: ThresholdLevel::Emergency, .. }]
        ));
    }

    #[test]
    fn test_growth_is_reported_once() {
        let (registry, pool) = setup(10);
        let monitor = PoolMonitor::new(registry, config()).unwrap();
        assert_eq!(monitor.sample().samples[0].grew_by, 0);

        let held: Vec<_> = (0..3).filter_map(|_| pool.acquire()).collect();
        assert_eq!(monitor.sample().samples[0].grew_by, 3);
        assert_eq!(monitor.sample().samples[0].grew_by, 0);
        drop(held);
    }

    #[test]
    fn test_busy_pool_is_skipped() {
        use crossbeam::channel;
        use std::sync::atomic::{AtomicBool, Ordering};

        let (entered_tx, entered_rx) = channel::unbounded::<()>();
        let (resume_tx, resume_rx) = channel::unbounded::<()>();
        let stall = Arc::new(AtomicBool::new(false));
        let stall_flag = Arc::clone(&stall);

        let registry = Arc::new(PoolRegistry::new());
        // Expansion runs the factory under the pool lock
        let blocked = registry
            .get_or_create(PoolSettings::new("blocked").with_max_size(2), move || {
                if stall_flag.load(Ordering::SeqCst) {
                    let _ = entered_tx.send(());
                    let _ = resume_rx.recv();
                }
                Enemy
            })
            .unwrap();
        registry
            .get_or_create(PoolSettings::new("free").with_max_size(2), Enemy::default)
            .unwrap();
        let monitor = PoolMonitor::new(Arc::clone(&registry), config()).unwrap();

        stall.store(true, Ordering::SeqCst);
        let acquirer = std::thread::spawn(move || blocked.acquire().is_some());
        entered_rx.recv().unwrap();

        let report = monitor.sample();
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.samples[0].key.name(), "free");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name(), "blocked");

        resume_tx.send(()).unwrap();
        assert!(acquirer.join().unwrap());
    }

    #[test]
    fn test_removed_pool_is_forgotten() {
        let (registry, pool) = setup(2);
        let monitor = PoolMonitor::new(Arc::clone(&registry), config()).unwrap();
        let _held: Vec<_> = (0..2).filter_map(|_| pool.acquire()).collect();
        assert_eq!(monitor.sample().events.len(), 1);

        registry.remove::<Enemy>("enemies");
        assert!(monitor.sample().samples.is_empty());
        assert!(monitor.previous.lock().is_empty());
    }

    #[test]
    fn test_tick_samples_on_interval() {
        let (registry, _pool) = setup(2);
        let monitor = PoolMonitor::new(registry, config()).unwrap();

        assert!(monitor.tick(Duration::from_millis(400)).is_none());
        assert!(monitor.tick(Duration::from_millis(400)).is_none());
        assert!(monitor.tick(Duration::from_millis(400)).is_some());
        // 200ms carried over
        assert!(monitor.tick(Duration::from_millis(700)).is_none());
        assert!(monitor.tick(Duration::from_millis(100)).is_some());
        // One long frame samples once
        assert!(monitor.tick(Duration::from_secs(10)).is_some());
        assert!(monitor.tick(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_report_aggregates() {
        let registry = Arc::new(PoolRegistry::new());
        let a = registry
            .get_or_create(PoolSettings::new("a").with_initial_size(2).with_max_size(4), Enemy::default)
            .unwrap();
        registry
            .get_or_create(PoolSettings::new("b").with_initial_size(1).with_max_size(4), Enemy::default)
            .unwrap();
        let monitor = PoolMonitor::new(registry, config()).unwrap();

        let _held = a.acquire().unwrap();
        let report = monitor.sample();
        assert_eq!(report.total_outstanding(), 1);
        assert_eq!(report.total_idle(), 2);
        assert_eq!(report.total_capacity(), 8);
        assert_eq!(report.overall_utilization(), 0.125);
        assert_eq!(report.sample_for("a").unwrap().metrics.outstanding_count, 1);
    }

    #[tokio::test]
    async fn test_spawned_monitor_emits_once_while_saturated() {
        let (registry, pool) = setup(1);
        let (sink, events) = ChannelSink::unbounded();
        let monitor = Arc::new(
            PoolMonitor::with_sink(
                registry,
                MonitorConfig::new().with_sample_interval(Duration::from_millis(10)),
                Arc::new(sink),
            )
            .unwrap(),
        );

        let _held = pool.acquire().unwrap();
        let task = Arc::clone(&monitor).spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(
            received[0],
            PoolEvent::ThresholdCrossed { level: ThresholdLevel::Emergency, .. }
        ));
    }
}

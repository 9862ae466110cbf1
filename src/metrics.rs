//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use warmpool::{ObjectPool, PoolSettings, PooledResource};
///
/// #[derive(Default)]
/// struct Spark;
///
/// impl PooledResource for Spark {
///     fn on_acquire(&mut self) {}
///     fn on_release(&mut self) {}
/// }
///
/// let pool = ObjectPool::new(Spark::default, PoolSettings::new("sparks").with_initial_size(3)).unwrap();
/// let _spark = pool.acquire().unwrap();
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.current_count, 2);
/// assert_eq!(metrics.outstanding_count, 1);
/// assert_eq!(metrics.total_count, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Diagnostic name of the pool
    pub name: String,

    /// Rust type of the pooled resource
    pub kind: String,

    /// Idle resources ready for reuse
    pub current_count: usize,

    /// Resources checked out to callers
    pub outstanding_count: usize,

    /// Resources the pool currently owns, idle or outstanding
    pub total_count: usize,

    /// Highest outstanding count observed
    pub peak_count: usize,

    pub initial_size: usize,

    pub max_size: usize,

    /// Outstanding resources as a fraction of `max_size` (0.0 to 1.0)
    pub utilization: f64,

    /// Successful acquisitions over the pool's lifetime
    pub total_acquired: usize,

    /// Successful releases over the pool's lifetime
    pub total_released: usize,

    /// Resources constructed on demand by `acquire()`
    pub expansions: usize,

    /// `acquire()` calls that found the pool exhausted
    pub exhaustions: usize,

    /// Rejected double or foreign releases
    pub protocol_violations: usize,
}

impl PoolMetrics {
    pub(crate) fn utilization_of(outstanding: usize, max_size: usize) -> f64 {
        if max_size > 0 {
            outstanding as f64 / max_size as f64
        } else {
            0.0
        }
    }

    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("name".to_string(), self.name.clone());
        metrics.insert("kind".to_string(), self.kind.clone());
        metrics.insert("current_count".to_string(), self.current_count.to_string());
        metrics.insert("outstanding_count".to_string(), self.outstanding_count.to_string());
        metrics.insert("total_count".to_string(), self.total_count.to_string());
        metrics.insert("peak_count".to_string(), self.peak_count.to_string());
        metrics.insert("initial_size".to_string(), self.initial_size.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("expansions".to_string(), self.expansions.to_string());
        metrics.insert("exhaustions".to_string(), self.exhaustions.to_string());
        metrics.insert("protocol_violations".to_string(), self.protocol_violations.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export a set of pool snapshots in Prometheus exposition format.
    ///
    /// Every series is labelled with the pool name and resource kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use warmpool::{MetricsExporter, PoolRegistry, PoolSettings, PooledResource};
    ///
    /// #[derive(Default)]
    /// struct Crate;
    ///
    /// impl PooledResource for Crate {
    ///     fn on_acquire(&mut self) {}
    ///     fn on_release(&mut self) {}
    /// }
    ///
    /// let registry = PoolRegistry::new();
    /// registry
    ///     .get_or_create(PoolSettings::new("crates").with_initial_size(2), Crate::default)
    ///     .unwrap();
    ///
    /// let output = MetricsExporter::export_prometheus(&registry.snapshot()).unwrap();
    /// assert!(output.contains("warmpool_resources_idle"));
    /// assert!(output.contains("pool=\"crates\""));
    /// ```
    pub fn export_prometheus(metrics: &[PoolMetrics]) -> crate::PoolResult<String> {
        use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

        const LABELS: &[&str] = &["pool", "kind"];

        let registry = Registry::new();

        let gauges: [(&str, &str, fn(&PoolMetrics) -> usize); 5] = [
            ("warmpool_resources_idle", "Idle resources ready for reuse", |m| m.current_count),
            ("warmpool_resources_outstanding", "Resources checked out to callers", |m| m.outstanding_count),
            ("warmpool_resources_total", "Resources owned by the pool", |m| m.total_count),
            ("warmpool_resources_peak", "Highest outstanding count observed", |m| m.peak_count),
            ("warmpool_resources_max", "Capacity ceiling of the pool", |m| m.max_size),
        ];
        for (name, help, read) in gauges {
            let vec = IntGaugeVec::new(Opts::new(name, help), LABELS).map_err(exporter_error)?;
            registry.register(Box::new(vec.clone())).map_err(exporter_error)?;
            for m in metrics {
                vec.with_label_values(&[m.name.as_str(), m.kind.as_str()])
                    .set(read(m) as i64);
            }
        }

        let counters: [(&str, &str, fn(&PoolMetrics) -> usize); 5] = [
            ("warmpool_acquired_total", "Successful acquisitions", |m| m.total_acquired),
            ("warmpool_released_total", "Successful releases", |m| m.total_released),
            ("warmpool_expansions_total", "Resources constructed on demand", |m| m.expansions),
            ("warmpool_exhaustions_total", "Acquisitions rejected at capacity", |m| m.exhaustions),
            ("warmpool_protocol_violations_total", "Rejected double or foreign releases", |m| m.protocol_violations),
        ];
        for (name, help, read) in counters {
            let vec = IntCounterVec::new(Opts::new(name, help), LABELS).map_err(exporter_error)?;
            registry.register(Box::new(vec.clone())).map_err(exporter_error)?;
            for m in metrics {
                vec.with_label_values(&[m.name.as_str(), m.kind.as_str()])
                    .inc_by(read(m) as u64);
            }
        }

        let utilization = GaugeVec::new(
            Opts::new("warmpool_utilization", "Outstanding resources as a fraction of max size"),
            LABELS,
        )
        .map_err(exporter_error)?;
        registry.register(Box::new(utilization.clone())).map_err(exporter_error)?;
        for m in metrics {
            utilization
                .with_label_values(&[m.name.as_str(), m.kind.as_str()])
                .set(m.utilization);
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(exporter_error)?;
        String::from_utf8(buffer).map_err(exporter_error)
    }
}

#[cfg(feature = "metrics")]
fn exporter_error(err: impl std::fmt::Display) -> crate::PoolError {
    crate::PoolError::Exporter(err.to_string())
}

/// Lifetime counters updated outside the pool lock
#[derive(Debug)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub expansions: AtomicUsize,
    pub exhaustions: AtomicUsize,
    pub protocol_violations: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_acquired: AtomicUsize::new(0),
            total_released: AtomicUsize::new(0),
            expansions: AtomicUsize::new(0),
            exhaustions: AtomicUsize::new(0),
            protocol_violations: AtomicUsize::new(0),
        }
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill the lifetime counters into a snapshot whose gauges are already set
    pub fn fill(&self, metrics: &mut PoolMetrics) {
        metrics.total_acquired = self.total_acquired.load(Ordering::Relaxed);
        metrics.total_released = self.total_released.load(Ordering::Relaxed);
        metrics.expansions = self.expansions.load(Ordering::Relaxed);
        metrics.exhaustions = self.exhaustions.load(Ordering::Relaxed);
        metrics.protocol_violations = self.protocol_violations.load(Ordering::Relaxed);
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolMetrics {
        PoolMetrics {
            name: "enemies".to_string(),
            kind: "game::Enemy".to_string(),
            current_count: 3,
            outstanding_count: 9,
            total_count: 12,
            peak_count: 10,
            initial_size: 4,
            max_size: 12,
            utilization: PoolMetrics::utilization_of(9, 12),
            total_acquired: 40,
            total_released: 31,
            expansions: 8,
            exhaustions: 2,
            protocol_violations: 1,
        }
    }

    #[test]
    fn test_utilization_handles_zero_capacity() {
        assert_eq!(PoolMetrics::utilization_of(0, 0), 0.0);
        assert_eq!(PoolMetrics::utilization_of(3, 4), 0.75);
    }

    #[test]
    fn test_export_map() {
        let exported = sample().export();
        assert_eq!(exported["outstanding_count"], "9");
        assert_eq!(exported["utilization"], "0.75");
        assert_eq!(exported["protocol_violations"], "1");
    }

    #[test]
    fn test_tracker_fill() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.total_acquired);
        MetricsTracker::record(&tracker.total_acquired);
        MetricsTracker::record(&tracker.exhaustions);

        let mut metrics = sample();
        tracker.fill(&mut metrics);
        assert_eq!(metrics.total_acquired, 2);
        assert_eq!(metrics.exhaustions, 1);
        assert_eq!(metrics.total_released, 0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let output = MetricsExporter::export_prometheus(&[sample()]).unwrap();
        assert!(output.contains("# TYPE warmpool_resources_outstanding gauge"));
        assert_eq!(series(&output, "warmpool_resources_outstanding"), "9");
        assert_eq!(series(&output, "warmpool_exhaustions_total"), "2");
        assert_eq!(series(&output, "warmpool_utilization"), "0.75");
        assert!(output.contains("pool=\"enemies\""));
        assert!(output.contains("kind=\"game::Enemy\""));
    }

    #[cfg(feature = "metrics")]
    fn series<'a>(output: &'a str, name: &str) -> &'a str {
        output
            .lines()
            .find(|line| line.starts_with(&format!("{name}{{")))
            .and_then(|line| line.rsplit(' ').next())
            .unwrap_or_default()
    }
}

//! Pool and monitor configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Whether `clear()` also resets the pool's peak outstanding count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeakPolicy {
    /// Peak is a lifetime high-water mark; only `reset_peak()` clears it
    #[default]
    Retain,

    /// Peak restarts from zero on every `clear()`
    ResetOnClear,
}

/// Configuration for a single object pool
///
/// # Examples
///
/// ```
/// use warmpool::PoolSettings;
///
/// let settings = PoolSettings::new("enemies")
///     .with_initial_size(50)
///     .with_max_size(120);
///
/// assert_eq!(settings.initial_size, 50);
/// assert_eq!(settings.max_size, 120);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolSettings {
    /// Diagnostic label used in events and logs
    pub name: String,

    /// Resources constructed eagerly when the pool is created
    pub initial_size: usize,

    /// Hard ceiling on resources the pool will ever hold at once
    pub max_size: usize,

    /// Peak behaviour on `clear()`
    pub peak_policy: PeakPolicy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            initial_size: 0,
            max_size: 100,
            peak_policy: PeakPolicy::Retain,
        }
    }
}

impl PoolSettings {
    /// Create settings with default sizes for the named pool
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the number of resources built up front
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Set the maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_peak_policy(mut self, policy: PeakPolicy) -> Self {
        self.peak_policy = policy;
        self
    }

    /// Check the bounds before any resource is constructed
    pub fn validate(&self) -> PoolResult<()> {
        if self.name.trim().is_empty() {
            return Err(PoolError::InvalidConfiguration(
                "pool name must not be empty".to_string(),
            ));
        }
        if self.initial_size > self.max_size {
            return Err(PoolError::InvalidConfiguration(format!(
                "pool '{}': initial_size {} exceeds max_size {}",
                self.name, self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Configuration for the pool monitor
///
/// # Examples
///
/// ```
/// use warmpool::MonitorConfig;
/// use std::time::Duration;
///
/// let config = MonitorConfig::new()
///     .with_sample_interval(Duration::from_millis(500))
///     .with_thresholds(0.6, 0.85);
///
/// assert_eq!(config.sample_interval(), Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MonitorConfig {
    /// Seconds between samples
    pub sample_interval_seconds: f64,

    /// Utilization at which a pool enters the warning level
    pub warning_ratio: f64,

    /// Utilization at which a pool enters the critical level
    pub critical_ratio: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_seconds: 1.0,
            warning_ratio: 0.75,
            critical_ratio: 0.9,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling interval
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval_seconds = interval.as_secs_f64();
        self
    }

    /// Set the warning and critical utilization ratios
    pub fn with_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.warning_ratio = warning;
        self.critical_ratio = critical;
        self
    }

    /// Sampling interval as a `Duration`. Always non-zero once `validate()` passes.
    pub fn sample_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.sample_interval_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> PoolResult<()> {
        match Duration::try_from_secs_f64(self.sample_interval_seconds) {
            Ok(interval) if !interval.is_zero() => {}
            _ => {
                return Err(PoolError::InvalidConfiguration(format!(
                    "sample interval must be a positive, representable number of seconds, got {}",
                    self.sample_interval_seconds
                )));
            }
        }
        for (label, ratio) in [
            ("warning_ratio", self.warning_ratio),
            ("critical_ratio", self.critical_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(PoolError::InvalidConfiguration(format!(
                    "{label} must be within [0, 1], got {ratio}"
                )));
            }
        }
        if self.warning_ratio > self.critical_ratio {
            return Err(PoolError::InvalidConfiguration(format!(
                "warning_ratio {} exceeds critical_ratio {}",
                self.warning_ratio, self.critical_ratio
            )));
        }
        Ok(())
    }
}

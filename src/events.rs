//! Structured pool events and the sinks that consume them

use crate::monitor::ThresholdLevel;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};

/// Something operators should know about a pool
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PoolEvent {
    /// A new resource was constructed because the idle set was empty
    Expanded {
        name: String,
        new_total: usize,
        max: usize,
    },

    /// `acquire()` found every resource up to `max` outstanding
    Exhausted { name: String, max: usize },

    /// Utilization rose into a higher threshold level
    ThresholdCrossed {
        name: String,
        level: ThresholdLevel,
        utilization: f64,
    },

    /// A resource was released while already idle
    DoubleReleaseDetected { name: String },

    /// A resource this pool does not own was released to it
    ForeignReleaseDetected { name: String },

    /// The pool dropped every resource it owned
    Cleared { name: String, destroyed: usize },
}

impl PoolEvent {
    /// Name of the pool the event refers to
    pub fn pool_name(&self) -> &str {
        match self {
            PoolEvent::Expanded { name, .. }
            | PoolEvent::Exhausted { name, .. }
            | PoolEvent::ThresholdCrossed { name, .. }
            | PoolEvent::DoubleReleaseDetected { name }
            | PoolEvent::ForeignReleaseDetected { name }
            | PoolEvent::Cleared { name, .. } => name,
        }
    }
}

/// Destination for pool events.
///
/// Pools and the monitor call `emit` after releasing their locks, so a slow
/// sink never blocks `acquire()` or `release()` on other threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PoolEvent);
}

impl<F> EventSink for F
where
    F: Fn(&PoolEvent) + Send + Sync,
{
    fn emit(&self, event: &PoolEvent) {
        self(event)
    }
}

/// Default sink: writes every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PoolEvent) {
        match event {
            PoolEvent::Expanded { name, new_total, max } => {
                info!(pool = %name, total = new_total, max = max, "Pool expanded");
            }
            PoolEvent::Exhausted { name, max } => {
                warn!(pool = %name, max = max, "Pool exhausted - no resource available");
            }
            PoolEvent::ThresholdCrossed { name, level, utilization } => match level {
                ThresholdLevel::Normal => {
                    debug!(pool = %name, utilization = utilization, "Pool utilization normal");
                }
                ThresholdLevel::Warning => {
                    warn!(pool = %name, threshold = %level, utilization = utilization, "Pool utilization threshold crossed");
                }
                ThresholdLevel::Critical | ThresholdLevel::Emergency => {
                    error!(pool = %name, threshold = %level, utilization = utilization, "Pool utilization threshold crossed");
                }
            },
            PoolEvent::DoubleReleaseDetected { name } => {
                warn!(pool = %name, "Resource released twice");
            }
            PoolEvent::ForeignReleaseDetected { name } => {
                warn!(pool = %name, "Resource released to a pool that does not own it");
            }
            PoolEvent::Cleared { name, destroyed } => {
                info!(pool = %name, destroyed = destroyed, "Pool cleared");
            }
        }
    }
}

/// Sink that forwards events over a crossbeam channel.
///
/// With a bounded channel, events are dropped rather than blocking the pool
/// when the receiver falls behind.
///
/// # Examples
///
/// ```
/// use warmpool::{ChannelSink, EventSink, PoolEvent};
///
/// let (sink, events) = ChannelSink::unbounded();
/// sink.emit(&PoolEvent::Exhausted { name: "sparks".to_string(), max: 8 });
///
/// assert_eq!(events.try_recv().unwrap().pool_name(), "sparks");
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<PoolEvent>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, Receiver<PoolEvent>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<PoolEvent>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &PoolEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                debug!(pool = %dropped.pool_name(), "Event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

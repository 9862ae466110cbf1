//! Error types for pools, the registry and the monitor

use crate::resource::ResourceId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource {id} was released twice to pool '{pool}'")]
    DoubleRelease { pool: String, id: ResourceId },

    #[error("Resource {id} is not tracked by pool '{pool}'")]
    ForeignResource { pool: String, id: ResourceId },

    #[error("No pool of kind {kind} is registered under '{name}'")]
    PoolNotFound { kind: &'static str, name: String },

    #[error("Pool '{name}' is registered with a different resource type")]
    KindMismatch { name: String },

    #[error("Pool '{pool}' is busy - metrics snapshot timed out")]
    Busy { pool: String },

    #[error("Metrics export failed: {0}")]
    Exporter(String),
}

impl PoolError {
    /// Whether this error is a release protocol violation by the caller
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            PoolError::DoubleRelease { .. } | PoolError::ForeignResource { .. }
        )
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

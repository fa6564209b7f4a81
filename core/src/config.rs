//! Batch configuration types

use serde::{Deserialize, Serialize};

/// Largest accepted pool size.
///
/// `tokio::sync::Semaphore` rejects more permits than this.
pub const MAX_POOL_SIZE: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Batch configuration
///
/// Controls how many units of work may run at once and whether the first
/// failure cancels the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of concurrently executing units; 0 means unbounded
    pub pool_size: usize,

    /// Cancel the batch when a unit reports an error or panics
    pub cancel_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            cancel_on_error: true,
        }
    }
}

impl BatchConfig {
    /// Create a new config with the given pool size
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Default::default()
        }
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the cancel-on-error policy
    pub fn with_cancel_on_error(mut self, flag: bool) -> Self {
        self.cancel_on_error = flag;
        self
    }

    /// Whether the pool limits concurrency at all
    pub fn is_bounded(&self) -> bool {
        self.pool_size > 0
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::InvalidPoolSize(format!(
                "pool size {} exceeds the maximum of {}",
                self.pool_size, MAX_POOL_SIZE
            )));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid pool size
    #[error("Invalid pool size: {0}")]
    InvalidPoolSize(String),
}

//! Builder pattern for Orchestrator construction

use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::error::{Error, Result};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with a validated configuration
///
/// # Example
///
/// ```ignore
/// let mut orchestrator: Orchestrator<String> = OrchestratorBuilder::new()
///     .pool_size(4)
///     .cancel_on_error(true)
///     .parent(&shutdown)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct OrchestratorBuilder {
    config: BatchConfig,
    parent: Option<CancellationToken>,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full batch configuration
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pool size; 0 means unbounded
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set whether the first unit error cancels the batch
    pub fn cancel_on_error(mut self, flag: bool) -> Self {
        self.config.cancel_on_error = flag;
        self
    }

    /// Derive the batch's cancellation from `parent`
    pub fn parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn build<T>(self) -> Result<Orchestrator<T>>
    where
        T: Send + 'static,
    {
        self.config
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;

        let parent = self.parent.unwrap_or_else(CancellationToken::new);
        Ok(Orchestrator::with_config(&parent, self.config))
    }
}

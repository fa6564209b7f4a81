//! Orchestrator execution logic

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::unit::{execute, ExecutionContext, UnitBuilder, UnitOfWork};

use super::aggregator::{ResultAggregator, ResultEntry};
use super::limiter::PoolLimiter;
use super::stats::BatchStats;

/// Orchestrator manages one batch of units of work
///
/// Units are registered first (pure bookkeeping), then [`run`](Self::run)
/// admits them in registration order through the pool limiter, waits for
/// every admitted unit, and returns the first recorded error.
pub struct Orchestrator<T> {
    /// Pool size and cancellation policy
    pub(crate) config: BatchConfig,

    /// Batch cancellation, a child of the caller's token
    pub(crate) cancel: CancellationToken,

    /// Registered units, in registration order
    pub(crate) units: Vec<UnitOfWork<T>>,

    /// Results and first error, shared with running units
    pub(crate) aggregator: Arc<ResultAggregator<T>>,

    /// Counters from the last run
    pub(crate) stats: BatchStats,

    /// Set once `run` has been called
    pub(crate) started: bool,
}

impl<T> Orchestrator<T>
where
    T: Send + 'static,
{
    /// Create an orchestrator whose batch is cancelled along with `parent`
    ///
    /// The pool is unbounded and cancel-on-error is enabled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self::with_config(parent, BatchConfig::default())
    }

    /// Create an orchestrator from an explicit configuration
    ///
    /// Use `OrchestratorBuilder` for validated construction.
    pub fn with_config(parent: &CancellationToken, config: BatchConfig) -> Self {
        Self {
            config,
            cancel: parent.child_token(),
            units: Vec::new(),
            aggregator: Arc::new(ResultAggregator::new()),
            stats: BatchStats::new(),
            started: false,
        }
    }

    /// Set the maximum number of concurrently executing units; 0 means unbounded
    ///
    /// Has no effect once the batch has started.
    pub fn set_pool_size(&mut self, size: usize) -> &mut Self {
        if !self.started {
            self.config.pool_size = size;
        }
        self
    }

    /// Set whether the first unit error cancels the batch
    ///
    /// Has no effect once the batch has started.
    pub fn set_cancel_on_error(&mut self, flag: bool) -> &mut Self {
        if !self.started {
            self.config.cancel_on_error = flag;
        }
        self
    }

    /// Get the batch configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Start describing a new unit of work for this batch
    pub fn new_unit<P>(&mut self) -> UnitBuilder<'_, T, P>
    where
        P: Send + 'static,
    {
        UnitBuilder::new(self)
    }

    pub(crate) fn push_unit(&mut self, unit: UnitOfWork<T>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        tracing::trace!(key = %unit.key, multiple = unit.multiple, "Unit registered");
        self.units.push(unit);
        Ok(())
    }

    /// Keys of the registered units, in registration order
    pub fn registered_keys(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.key())
    }

    /// Number of units waiting to run
    pub fn pending(&self) -> usize {
        self.units.len()
    }

    /// Get a handle that cancels this batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the batch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the batch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the batch to completion
    ///
    /// Admits every registered unit, respecting the pool size, until the
    /// batch is cancelled; then waits for all admitted units. Returns the
    /// first error recorded by any unit.
    ///
    /// Duplicate keys are checked before anything is admitted: a key reused
    /// without `multiple` rejects the whole batch, so no unit runs at all,
    /// including those registered ahead of the duplicate.
    ///
    /// # Errors
    /// Returns the batch error, or [`Error::AlreadyStarted`] when called a
    /// second time.
    pub async fn run(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let start = Instant::now();
        let units = std::mem::take(&mut self.units);
        self.stats.registered = units.len();

        tracing::info!(
            units = units.len(),
            pool_size = self.config.pool_size,
            cancel_on_error = self.config.cancel_on_error,
            "Starting batch"
        );

        if let Some(key) = find_duplicate_key(&units) {
            let err = Error::DuplicateKey { key };
            tracing::error!(error = %err, "Rejecting batch");
            self.aggregator.record_error(err);
            self.cancel.cancel();
        } else {
            self.admit_and_wait(units).await;
        }

        self.stats.skipped = self.stats.registered - self.stats.admitted;
        self.stats.elapsed = start.elapsed();

        tracing::info!(
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            admitted = self.stats.admitted,
            skipped = self.stats.skipped,
            completed = self.stats.completed,
            failed = self.stats.failed,
            timed_out = self.stats.timed_out,
            abandoned = self.stats.abandoned,
            "Batch finished"
        );

        match self.aggregator.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn admit_and_wait(&mut self, units: Vec<UnitOfWork<T>>) {
        let limiter = PoolLimiter::new(self.config.pool_size);
        let ctx = Arc::new(ExecutionContext::new(
            Arc::clone(&self.aggregator),
            self.cancel.clone(),
            self.config.cancel_on_error,
        ));
        let mut tasks = JoinSet::new();

        for unit in units {
            let Some(slot) = limiter.acquire(&self.cancel).await else {
                tracing::debug!(
                    next = %unit.key,
                    admitted = self.stats.admitted,
                    "Batch cancelled, admission stopped"
                );
                break;
            };

            self.stats.admitted += 1;
            tracing::trace!(key = %unit.key, free_slots = ?limiter.available(), "Unit admitted");
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let outcome = execute(unit, ctx).await;
                drop(slot);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => self.stats.record(outcome),
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::error!(error = %e, "Unit task failed");
                }
            }
        }
    }

    /// Counters from the last run
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Take every aggregated result
    pub fn into_results(self) -> HashMap<String, ResultEntry<T>> {
        self.aggregator.take_results()
    }
}

impl<T> Orchestrator<T>
where
    T: Clone + Send + 'static,
{
    /// Get the aggregated value for `key`
    ///
    /// Returns `None` if nothing was written under the key: the unit
    /// returned no value, failed, or never ran.
    pub fn get_result(&self, key: &str) -> Option<ResultEntry<T>> {
        self.aggregator.get(key)
    }
}

impl<T> Default for Orchestrator<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new(&CancellationToken::new())
    }
}

impl<T> std::fmt::Debug for Orchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("units", &self.units)
            .field("started", &self.started)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// First key reused by a unit registered without `multiple`
fn find_duplicate_key<T>(units: &[UnitOfWork<T>]) -> Option<String> {
    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.key.as_str()) && !unit.multiple {
            return Some(unit.key.clone());
        }
    }
    None
}

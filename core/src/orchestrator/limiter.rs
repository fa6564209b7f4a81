//! Pool limiter gating how many units run at once

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting admission gate of fixed capacity, or unlimited
#[derive(Debug)]
pub(crate) struct PoolLimiter {
    semaphore: Option<Arc<Semaphore>>,
}

/// One admission slot; released on drop
#[derive(Debug)]
pub(crate) struct PoolSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl PoolLimiter {
    /// Create a limiter admitting at most `capacity` units; 0 means unlimited
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            semaphore: (capacity > 0).then(|| Arc::new(Semaphore::new(capacity))),
        }
    }

    /// Wait for a free slot
    ///
    /// Returns `None` once `cancel` has fired, whether before or while
    /// waiting, so admission stops on the first cancellation.
    pub(crate) async fn acquire(&self, cancel: &CancellationToken) -> Option<PoolSlot> {
        if cancel.is_cancelled() {
            return None;
        }

        let Some(semaphore) = &self.semaphore else {
            return Some(PoolSlot { _permit: None });
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => None,

            permit = Arc::clone(semaphore).acquire_owned() => {
                permit.ok().map(|permit| PoolSlot { _permit: Some(permit) })
            }
        }
    }

    /// Number of free slots, or `None` when unlimited
    pub(crate) fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

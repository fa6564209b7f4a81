//! Single-value result delivery between a unit's function and its wrapper
//!
//! The wrapper stops listening as soon as it sees cancellation or a time
//! limit, while the function may still finish later and try to deliver.
//! [`SafeResultChannel`] makes that late delivery a no-op: a write after
//! [`SafeResultChannel::close`] never blocks and never panics, and `close`
//! waits for any write already in progress so no write races past it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;

type Slot<T> = Mutex<Option<oneshot::Sender<T>>>;

/// Reading side of a single-value result channel
#[derive(Debug)]
pub struct SafeResultChannel<T> {
    rx: oneshot::Receiver<T>,
    slot: Weak<Slot<T>>,
    writer: Option<ResultWriter<T>>,
}

/// Writing side of a [`SafeResultChannel`]
///
/// Cloneable; the first successful write wins and later writes are dropped.
#[derive(Debug)]
pub struct ResultWriter<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for ResultWriter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> SafeResultChannel<T> {
    /// Create an open channel
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        Self {
            rx,
            slot: Arc::downgrade(&slot),
            writer: Some(ResultWriter { slot }),
        }
    }

    /// Hand out the writer for this channel
    ///
    /// The first call takes the channel's own writer; later calls clone one
    /// from the shared slot while any writer is still alive. Once every
    /// writer is dropped without writing, [`read`](Self::read) resolves to
    /// `None`.
    pub fn writer(&mut self) -> ResultWriter<T> {
        if let Some(writer) = self.writer.take() {
            return writer;
        }

        match self.slot.upgrade() {
            Some(slot) => ResultWriter { slot },
            // Every writer is gone: hand out one that is already closed.
            None => ResultWriter {
                slot: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Wait for the delivered value
    ///
    /// Returns `None` if the channel was closed, or every writer was dropped,
    /// before a value arrived. Cancel safe.
    pub async fn read(&mut self) -> Option<T> {
        (&mut self.rx).await.ok()
    }

    /// Close the channel
    ///
    /// Blocks until a write that is currently in progress has finished; every
    /// write started afterwards is discarded.
    pub fn close(&mut self) {
        self.writer = None;
        if let Some(slot) = self.slot.upgrade() {
            slot.lock().take();
        }
        self.rx.close();
    }

    /// Whether the channel no longer accepts writes
    pub fn is_closed(&self) -> bool {
        match self.slot.upgrade() {
            Some(slot) => slot.lock().is_none(),
            None => true,
        }
    }
}

impl<T> Default for SafeResultChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SafeResultChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> ResultWriter<T> {
    /// Deliver a value
    ///
    /// Returns `false` when the value was discarded because the channel was
    /// closed, the reader went away, or another write already won.
    pub fn write(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        match slot.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

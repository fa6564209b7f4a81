//! Unit of work execution wrapper

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::channel::SafeResultChannel;
use crate::error::Error;
use crate::orchestrator::ResultAggregator;

use super::builder::UnitOfWork;

/// What a unit's function task delivers to its wrapper
enum Delivery<T> {
    Returned(anyhow::Result<Option<T>>),
    Panicked { message: String, backtrace: String },
}

/// How a unit of work ended, as seen by its wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitOutcome {
    /// The function returned a value and it was aggregated
    Published,
    /// The function returned no value
    Empty,
    /// The function failed, panicked, vanished, or its value was rejected
    Failed,
    /// The time limit elapsed first
    TimedOut,
    /// The batch was cancelled first
    Abandoned,
}

/// Batch state shared by every running unit
pub(crate) struct ExecutionContext<T> {
    aggregator: Arc<ResultAggregator<T>>,
    cancel: CancellationToken,
    cancel_on_error: bool,
}

impl<T> ExecutionContext<T> {
    pub(crate) fn new(
        aggregator: Arc<ResultAggregator<T>>,
        cancel: CancellationToken,
        cancel_on_error: bool,
    ) -> Self {
        Self {
            aggregator,
            cancel,
            cancel_on_error,
        }
    }

    /// Record a unit failure and apply the cancel-on-error policy
    pub(crate) fn fail(&self, err: Error) {
        let first = self.aggregator.record_error(err);
        if self.cancel_on_error {
            if first {
                tracing::debug!("Cancelling batch after first error");
            }
            self.cancel.cancel();
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static TRACE_HOOK: Once = Once::new();

/// Chain a panic hook that records the stack at the panic site
///
/// `catch_unwind` only sees the payload once the stack is gone, so the
/// trace is stashed per thread by the hook and picked up after the catch.
fn install_trace_hook() {
    TRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Take the trace recorded for the last panic on this thread
fn take_panic_trace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Run one admitted unit to an outcome
///
/// The function runs on its own task so the wrapper can stop waiting on it;
/// a function that finishes after the wrapper gave up has its result
/// discarded by the closed channel.
pub(crate) async fn execute<T>(unit: UnitOfWork<T>, ctx: Arc<ExecutionContext<T>>) -> UnitOutcome
where
    T: Send + 'static,
{
    let UnitOfWork {
        key,
        multiple,
        timeout,
        work,
    } = unit;

    let mut channel = SafeResultChannel::new();
    let writer = channel.writer();

    install_trace_hook();

    let task_key = key.clone();
    tokio::spawn(async move {
        let delivery = match AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
        {
            Ok(returned) => Delivery::Returned(returned),
            Err(payload) => Delivery::Panicked {
                message: panic_message(&*payload),
                backtrace: take_panic_trace(),
            },
        };

        if !writer.write(delivery) {
            tracing::debug!(key = %task_key, "Discarding late result");
        }
    });

    tracing::debug!(key = %key, multiple, timeout = ?timeout, "Unit started");

    let outcome = tokio::select! {
        biased;

        delivery = channel.read() => handle_delivery(&key, multiple, delivery, &ctx),

        _ = ctx.cancel.cancelled() => {
            tracing::warn!(key = %key, "Batch cancelled, abandoning unit");
            UnitOutcome::Abandoned
        }

        _ = time_limit(timeout) => {
            let limit = timeout.unwrap_or_default();
            let err = Error::TimedOut { key: key.clone(), limit };
            tracing::error!(key = %key, limit_ms = limit.as_millis() as u64, "{err}");
            ctx.fail(err);
            UnitOutcome::TimedOut
        }
    };

    channel.close();
    tracing::debug!(key = %key, outcome = ?outcome, "Unit finished");

    outcome
}

fn handle_delivery<T>(
    key: &str,
    multiple: bool,
    delivery: Option<Delivery<T>>,
    ctx: &ExecutionContext<T>,
) -> UnitOutcome {
    match delivery {
        Some(Delivery::Returned(Ok(value))) => match ctx.aggregator.write(key, value, multiple) {
            Ok(true) => UnitOutcome::Published,
            Ok(false) => UnitOutcome::Empty,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Result rejected");
                ctx.fail(err);
                UnitOutcome::Failed
            }
        },
        Some(Delivery::Returned(Err(source))) => {
            let err = Error::task(key, source);
            tracing::debug!(key = %key, error = %err, "Unit returned an error");
            ctx.fail(err);
            UnitOutcome::Failed
        }
        Some(Delivery::Panicked { message, backtrace }) => {
            tracing::error!(
                key = %key,
                panic = %message,
                "panic recovered. stacktrace:\n{backtrace}"
            );
            ctx.fail(Error::Panicked {
                key: key.to_string(),
                message,
                backtrace,
            });
            UnitOutcome::Failed
        }
        None => {
            let err = Error::Lost {
                key: key.to_string(),
            };
            tracing::error!(key = %key, "{err}");
            ctx.fail(err);
            UnitOutcome::Failed
        }
    }
}

async fn time_limit(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! Tests for the unit execution wrapper

use super::builder::UnitOfWork;
use super::{execute, ExecutionContext, UnitOutcome};
use crate::error::Error;
use crate::orchestrator::{ResultAggregator, ResultEntry};

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn unit<T, Fut>(key: &str, multiple: bool, timeout: Option<Duration>, f: Fut) -> UnitOfWork<T>
where
    T: Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
{
    UnitOfWork {
        key: key.to_string(),
        multiple,
        timeout,
        work: Box::new(move || f.boxed()),
    }
}

struct Harness<T> {
    aggregator: Arc<ResultAggregator<T>>,
    cancel: CancellationToken,
    ctx: Arc<ExecutionContext<T>>,
}

fn harness<T>(cancel_on_error: bool) -> Harness<T> {
    let aggregator = Arc::new(ResultAggregator::new());
    let cancel = CancellationToken::new();
    let ctx = Arc::new(ExecutionContext::new(
        Arc::clone(&aggregator),
        cancel.clone(),
        cancel_on_error,
    ));
    Harness {
        aggregator,
        cancel,
        ctx,
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_value_is_published() {
    let h = harness::<String>(true);

    let outcome = execute(
        unit("k", false, None, async { Ok(Some("v".to_string())) }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Published);
    assert_eq!(h.aggregator.get("k"), Some(ResultEntry::Single("v".to_string())));
    assert!(!h.cancel.is_cancelled());
}

#[tokio::test]
async fn test_empty_value_leaves_key_absent() {
    let h = harness::<String>(true);

    let outcome = execute(unit("k", true, None, async { Ok(None) }), Arc::clone(&h.ctx)).await;

    assert_eq!(outcome, UnitOutcome::Empty);
    assert!(!h.aggregator.contains("k"));
    assert!(!h.aggregator.has_error());
}

#[tokio::test]
async fn test_error_is_recorded_and_cancels() {
    let h = harness::<String>(true);

    let outcome = execute(
        unit("k", false, None, async { Err(anyhow::anyhow!("boom")) }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert!(h.cancel.is_cancelled());

    let err = h.aggregator.take_error().expect("error recorded");
    assert!(matches!(err, Error::Task { .. }));
    assert_eq!(err.key(), Some("k"));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_error_without_cancel_on_error() {
    let h = harness::<String>(false);

    let outcome = execute(
        unit("k", false, None, async { Err(anyhow::anyhow!("boom")) }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert!(h.aggregator.has_error());
    assert!(!h.cancel.is_cancelled());
}

#[tokio::test]
async fn test_panic_becomes_error() {
    let h = harness::<String>(true);

    let outcome = execute(
        unit("k", false, None, async {
            if true {
                panic!("something broke");
            }
            Ok(None)
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert!(h.cancel.is_cancelled());

    let err = h.aggregator.take_error().expect("error recorded");
    assert!(err.is_panic());
    assert!(err.to_string().contains("something broke"));
}

#[tokio::test]
async fn test_panic_with_formatted_payload() {
    let h = harness::<u8>(true);
    let code = 7;

    execute(
        unit("k", false, None, async move {
            if code > 0 {
                panic!("exit code {code}");
            }
            Ok(None)
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    match h.aggregator.take_error() {
        Some(Error::Panicked { message, .. }) => assert_eq!(message, "exit code 7"),
        other => panic!("Expected Panicked, got {other:?}"),
    }
}

#[inline(never)]
fn explode_at_named_site() {
    panic!("fault deep in user code");
}

#[tokio::test]
async fn test_panic_trace_points_at_panic_site() {
    let h = harness::<String>(true);

    execute(
        unit("k", false, None, async {
            explode_at_named_site();
            Ok(None)
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    match h.aggregator.take_error() {
        Some(Error::Panicked {
            message, backtrace, ..
        }) => {
            assert_eq!(message, "fault deep in user code");
            assert!(
                backtrace.contains("explode_at_named_site"),
                "trace does not reach the panic site:\n{backtrace}"
            );
        }
        other => panic!("Expected Panicked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shape_mismatch_fails_unit() {
    let h = harness::<u32>(true);
    h.aggregator.write("k", Some(1), false).unwrap();

    let outcome = execute(unit("k", true, None, async { Ok(Some(2)) }), Arc::clone(&h.ctx)).await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert!(h.cancel.is_cancelled());
    assert_eq!(h.aggregator.get("k"), Some(ResultEntry::Single(1)));
    assert!(h
        .aggregator
        .take_error()
        .expect("error recorded")
        .to_string()
        .contains("cannot append result"));
}

// ============================================================================
// Racing against cancellation and time limits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_discards_late_result() {
    let h = harness::<String>(true);

    let outcome = execute(
        unit("slow", false, Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Some("late".to_string()))
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::TimedOut);
    assert!(h.cancel.is_cancelled());
    match h.aggregator.take_error() {
        Some(Error::TimedOut { key, limit }) => {
            assert_eq!(key, "slow");
            assert_eq!(limit, Duration::from_millis(20));
        }
        other => panic!("Expected TimedOut, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!h.aggregator.contains("slow"));
}

#[tokio::test]
async fn test_cancellation_abandons_without_error() {
    let h = harness::<String>(true);
    let cancel = h.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let outcome = execute(
        unit("k", false, None, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("never".to_string()))
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Abandoned);
    assert!(!h.aggregator.has_error());
    assert!(!h.aggregator.contains("k"));
}

#[tokio::test]
async fn test_cancelled_batch_abandons_immediately() {
    let h = harness::<String>(true);
    h.cancel.cancel();

    let outcome = execute(
        unit("k", false, None, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some("ignored".to_string()))
        }),
        Arc::clone(&h.ctx),
    )
    .await;

    assert_eq!(outcome, UnitOutcome::Abandoned);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h.aggregator.contains("k"));
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_unit_accessors_and_debug() {
    let u = unit::<(), _>("key", true, Some(Duration::from_secs(1)), async { Ok(None) });

    assert_eq!(u.key(), "key");
    assert!(u.is_multiple());
    assert_eq!(u.timeout(), Some(Duration::from_secs(1)));

    let debug = format!("{:?}", u);
    assert!(debug.contains("UnitOfWork"));
    assert!(debug.contains("key"));
}

#[test]
fn test_zero_timeout_means_no_limit() {
    let mut orchestrator: crate::Orchestrator<()> = crate::Orchestrator::default();
    orchestrator
        .new_unit()
        .func(|()| async { Ok(None) })
        .timeout(Duration::ZERO)
        .register("unlimited")
        .unwrap();
    orchestrator
        .new_unit()
        .func(|()| async { Ok(None) })
        .timeout(Duration::from_millis(5))
        .register("limited")
        .unwrap();

    let timeouts: Vec<_> = orchestrator.units.iter().map(UnitOfWork::timeout).collect();
    assert_eq!(timeouts, vec![None, Some(Duration::from_millis(5))]);
}

#[test]
fn test_register_keeps_multiple_flag() {
    let mut orchestrator: crate::Orchestrator<u8> = crate::Orchestrator::default();
    orchestrator
        .new_unit()
        .func(|n: u8| async move { Ok(Some(n)) })
        .param(3)
        .multiple()
        .register("k")
        .unwrap();

    assert!(orchestrator.units[0].is_multiple());
    assert_eq!(orchestrator.units[0].key(), "k");
}

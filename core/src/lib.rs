//! taskbatch-core: Run a batch of keyed async functions concurrently
//!
//! This crate provides the orchestration primitive used by the `taskbatch`
//! binary, including:
//!
//! - Unit of work registration with per-unit parameters and time limits
//! - Pool-limited admission and cancel-on-first-error
//! - Panic containment and keyed result aggregation
//! - A single-value result channel that tolerates late writers
//! - Typed coercion of JSON-valued results

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod coerce;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod unit;

pub use channel::{ResultWriter, SafeResultChannel};
pub use coerce::{result_bool, result_int, result_obj, result_string, CoercionError};
pub use config::{BatchConfig, ConfigError, MAX_POOL_SIZE};
pub use error::{BoxError, Error, Result, Shape};
pub use orchestrator::{BatchStats, Orchestrator, OrchestratorBuilder, ResultAggregator, ResultEntry};
pub use unit::{DefaultParam, ParamSource, UnitBuilder, UnitOfWork, WithParam};

#[cfg(test)]
mod integration_tests {
    use super::*;

    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    // =========================================================================
    // End-to-end batches through the public API
    // =========================================================================

    #[tokio::test]
    async fn test_json_batch_with_coercion() {
        let parent = CancellationToken::new();
        let mut orchestrator: Orchestrator<Value> = OrchestratorBuilder::new()
            .pool_size(2)
            .parent(&parent)
            .build()
            .expect("Failed to build orchestrator");

        orchestrator
            .new_unit()
            .func(|name: String| async move { Ok(Some(json!(name))) })
            .param("taskbatch".to_string())
            .register("name")
            .unwrap();

        orchestrator
            .new_unit()
            .func(|()| async { Ok(Some(json!(3))) })
            .register("count")
            .unwrap();

        orchestrator
            .new_unit()
            .func(|()| async { Ok(Some(json!(true))) })
            .timeout(Duration::from_secs(1))
            .register("ready")
            .unwrap();

        for i in 0..3 {
            orchestrator
                .new_unit()
                .func(|i: i64| async move { Ok(Some(json!({ "index": i }))) })
                .param(i)
                .multiple()
                .register("items")
                .unwrap();
        }

        orchestrator.run().await.expect("Run failed");

        assert_eq!(
            result_string(orchestrator.get_result("name").as_ref()).unwrap(),
            "taskbatch"
        );
        assert_eq!(result_int(orchestrator.get_result("count").as_ref()).unwrap(), 3);
        assert!(result_bool(orchestrator.get_result("ready").as_ref()).unwrap());

        let items: Vec<Value> = result_obj(orchestrator.get_result("items").as_ref()).unwrap();
        assert_eq!(items.len(), 3);

        let stats = orchestrator.stats();
        assert_eq!(stats.published, 6);
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_error_surfaces_through_public_api() {
        let mut orchestrator: Orchestrator<Value> = Orchestrator::default();

        orchestrator
            .new_unit()
            .func(|()| async { Err(anyhow::anyhow!("upstream unavailable")) })
            .register("fetch")
            .unwrap();

        let err = orchestrator.run().await.unwrap_err();
        assert_eq!(err.key(), Some("fetch"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(matches!(
            result_obj::<Value>(orchestrator.get_result("fetch").as_ref()),
            Err(CoercionError::Missing)
        ));
    }
}

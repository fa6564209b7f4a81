//! Orchestrator for batch lifecycle management
//!
//! The Orchestrator coordinates one batch of units of work:
//! - Admitting registered units in order through a pool limiter
//! - Cancelling the batch on the first error when configured to
//! - Waiting for every admitted unit to finish
//! - Aggregating results under their keys
//!
//! # Example
//!
//! ```ignore
//! use taskbatch_core::OrchestratorBuilder;
//!
//! let mut orchestrator = OrchestratorBuilder::new().pool_size(4).build()?;
//!
//! orchestrator
//!     .new_unit()
//!     .func(|()| async { Ok(Some("pong".to_string())) })
//!     .register("ping")?;
//!
//! orchestrator.run().await?;
//! let pong = orchestrator.get_result("ping");
//! ```

mod aggregator;
mod builder;
mod executor;
mod limiter;
mod stats;

pub use aggregator::{ResultAggregator, ResultEntry};
pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
pub use stats::BatchStats;

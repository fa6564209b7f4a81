//! Units of work: one keyed function run per batch slot
//!
//! A unit is described through a [`UnitBuilder`] obtained from
//! [`Orchestrator::new_unit`](crate::Orchestrator::new_unit) and becomes an
//! immutable [`UnitOfWork`] once registered. When the batch runs, each
//! admitted unit goes through the execution wrapper, which:
//!
//! 1. Starts the function on its own tokio task with the stored parameter
//! 2. Contains panics and turns them into errors with a captured backtrace
//! 3. Races the result against batch cancellation and the unit's time limit
//! 4. Publishes a non-empty result into the batch's result aggregator
//!
//! # Example
//!
//! ```ignore
//! orchestrator
//!     .new_unit()
//!     .func(|id: u64| async move { Ok(Some(load_user(id).await?)) })
//!     .param(42)
//!     .timeout(Duration::from_secs(2))
//!     .register("user")?;
//! ```

mod builder;
mod executor;

pub use builder::{DefaultParam, ParamSource, UnitBuilder, UnitOfWork, WithParam};
pub(crate) use executor::{execute, ExecutionContext, UnitOutcome};

#[cfg(test)]
mod tests;

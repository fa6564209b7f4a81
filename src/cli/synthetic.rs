//! Synthetic units of work for exercising a batch from the command line

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use taskbatch_core::Orchestrator;

use super::RunArgs;

/// Key shared by every unit when results are appended
pub const SHARED_KEY: &str = "units";

/// What one synthetic unit does when it runs
#[derive(Debug, Clone, Default)]
struct UnitPlan {
    index: usize,
    delay: Duration,
    fail: bool,
    panic: bool,
}

async fn perform(plan: UnitPlan) -> anyhow::Result<Option<Value>> {
    let start = Instant::now();
    tokio::time::sleep(plan.delay).await;

    if plan.panic {
        panic!("unit {} panicked on request", plan.index);
    }
    if plan.fail {
        anyhow::bail!("unit {} failed on request", plan.index);
    }

    Ok(Some(json!({
        "index": plan.index,
        "elapsed_ms": start.elapsed().as_millis() as u64,
    })))
}

/// A batch of sleeping units, some of which may be told to fail or panic
#[derive(Debug, Clone)]
pub struct SyntheticBatch {
    units: usize,
    delay: Duration,
    timeout: Duration,
    fail_key: Option<String>,
    panic_key: Option<String>,
    multiple: bool,
}

impl SyntheticBatch {
    /// Describe the batch requested on the command line
    pub fn from_args(args: &RunArgs) -> Self {
        Self {
            units: args.units,
            delay: Duration::from_millis(args.delay_ms),
            timeout: Duration::from_millis(args.timeout_ms),
            fail_key: args.fail_key.clone(),
            panic_key: args.panic_key.clone(),
            multiple: args.multiple,
        }
    }

    /// Name of the `index`th unit
    pub fn unit_name(index: usize) -> String {
        format!("unit-{index}")
    }

    /// Register every unit with `orchestrator`
    ///
    /// Units are named `unit-0`, `unit-1`, ... and each writes under its own
    /// name unless the batch appends under [`SHARED_KEY`].
    pub fn register(&self, orchestrator: &mut Orchestrator<Value>) -> taskbatch_core::Result<()> {
        for index in 0..self.units {
            let name = Self::unit_name(index);
            let plan = UnitPlan {
                index,
                delay: self.delay,
                fail: self.fail_key.as_deref() == Some(name.as_str()),
                panic: self.panic_key.as_deref() == Some(name.as_str()),
            };

            let unit = orchestrator
                .new_unit()
                .func(perform)
                .param(plan)
                .timeout(self.timeout);

            if self.multiple {
                unit.multiple().register(SHARED_KEY)?;
            } else {
                unit.register(name)?;
            }
        }

        tracing::debug!(units = self.units, multiple = self.multiple, "Synthetic batch registered");
        Ok(())
    }
}

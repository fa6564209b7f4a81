//! Batch statistics

use std::time::Duration;

use serde::Serialize;

use crate::unit::UnitOutcome;

/// Counters describing how one batch ran
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Units registered before the run
    pub registered: usize,

    /// Units admitted for execution
    pub admitted: usize,

    /// Units never admitted because admission stopped
    pub skipped: usize,

    /// Units whose function returned successfully
    pub completed: usize,

    /// Completed units whose value was aggregated
    pub published: usize,

    /// Units that failed, panicked, or had their value rejected
    pub failed: usize,

    /// Units that reached their time limit
    pub timed_out: usize,

    /// Units abandoned because the batch was cancelled
    pub abandoned: usize,

    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl BatchStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Units that reached an outcome of any kind
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.timed_out + self.abandoned
    }

    /// Get success rate among admitted units (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.admitted == 0 {
            0.0
        } else {
            self.completed as f64 / self.admitted as f64
        }
    }

    pub(crate) fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Published => {
                self.completed += 1;
                self.published += 1;
            }
            UnitOutcome::Empty => self.completed += 1,
            UnitOutcome::Failed => self.failed += 1,
            UnitOutcome::TimedOut => self.timed_out += 1,
            UnitOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = BatchStats::new();
        assert_eq!(stats.finished(), 0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_record_outcomes() {
        let mut stats = BatchStats {
            admitted: 5,
            ..Default::default()
        };
        stats.record(UnitOutcome::Published);
        stats.record(UnitOutcome::Empty);
        stats.record(UnitOutcome::Failed);
        stats.record(UnitOutcome::TimedOut);
        stats.record(UnitOutcome::Abandoned);

        assert_eq!(stats.completed, 2);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.finished(), 5);
        assert!((stats.success_rate() - 0.4).abs() < 0.001);
    }

    #[test]
    fn test_stats_serialize_elapsed_as_millis() {
        let stats = BatchStats {
            elapsed: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["elapsed"], 1500);
    }
}

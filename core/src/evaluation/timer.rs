//! Stage-isolated scoped timing
//!
//! Each pipeline stage gets its own duration bucket. A stage is timed by
//! holding a guard over the stage body; the guard adds the elapsed time to
//! its bucket when dropped, so attribution survives early returns from a
//! failing stage.

use std::time::{Duration, Instant};

/// The four timed stages of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Input standardization. Declared no-op at test time; always zero.
    Standardize,

    /// Dimensionality reduction, when a projection is configured.
    Project,

    /// Threshold seeking. A training-only concept; always zero here.
    Seek,

    /// Detector scoring over the full test set.
    Predict,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Standardize, Stage::Project, Stage::Seek, Stage::Predict];

    fn index(self) -> usize {
        match self {
            Stage::Standardize => 0,
            Stage::Project => 1,
            Stage::Seek => 2,
            Stage::Predict => 3,
        }
    }
}

/// Accumulated per-stage durations for one evaluation.
#[derive(Debug, Default, Clone)]
pub struct StageClock {
    buckets: [Duration; 4],
}

impl StageClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing a stage; the elapsed time lands in the stage's bucket
    /// when the returned guard drops.
    pub fn enter(&mut self, stage: Stage) -> StageGuard<'_> {
        StageGuard {
            bucket: &mut self.buckets[stage.index()],
            started: Instant::now(),
        }
    }

    pub fn stage(&self, stage: Stage) -> Duration {
        self.buckets[stage.index()]
    }

    pub fn secs(&self, stage: Stage) -> f64 {
        self.stage(stage).as_secs_f64()
    }

    /// Total test time: the sum of all four stage buckets.
    pub fn total(&self) -> Duration {
        self.buckets.iter().sum()
    }

    pub fn total_secs(&self) -> f64 {
        self.total().as_secs_f64()
    }
}

/// Accumulates elapsed time into one stage bucket on drop.
#[derive(Debug)]
pub struct StageGuard<'a> {
    bucket: &'a mut Duration,
    started: Instant,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        *self.bucket += self.started.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_accumulates_into_bucket() {
        let mut clock = StageClock::new();
        {
            let _guard = clock.enter(Stage::Predict);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(clock.stage(Stage::Predict) >= Duration::from_millis(2));
        assert_eq!(clock.stage(Stage::Seek), Duration::ZERO);
    }

    #[test]
    fn test_total_is_sum_of_buckets() {
        let mut clock = StageClock::new();
        {
            let _guard = clock.enter(Stage::Project);
        }
        {
            let _guard = clock.enter(Stage::Predict);
        }
        let sum: Duration = Stage::ALL.iter().map(|s| clock.stage(*s)).sum();
        assert_eq!(clock.total(), sum);
    }

    #[test]
    fn test_attribution_survives_early_return() {
        fn failing_stage(clock: &mut StageClock) -> Result<(), ()> {
            let _guard = clock.enter(Stage::Project);
            std::thread::sleep(Duration::from_millis(1));
            Err(())
        }

        let mut clock = StageClock::new();
        assert!(failing_stage(&mut clock).is_err());
        assert!(clock.stage(Stage::Project) > Duration::ZERO);
    }

    #[test]
    fn test_repeated_entry_accumulates() {
        let mut clock = StageClock::new();
        for _ in 0..3 {
            let _guard = clock.enter(Stage::Predict);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(clock.stage(Stage::Predict) >= Duration::from_millis(3));
    }
}

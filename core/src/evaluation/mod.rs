//! Instrumented evaluation of rehydrated models
//!
//! One evaluation runs the project-score-AUC pipeline over a held-out test
//! set with each stage timed in isolation; the trial runner repeats it on
//! independent copies to stabilize the timing measurement. Scoring quality
//! is deterministic, so only the time component actually needs averaging,
//! but both values are averaged uniformly for consistency.

pub mod roc;
pub mod timer;

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::model::{Detector, Projection};
use crate::telemetry::{log_telemetry, Telemetry};
use self::timer::{Stage, StageClock};

/// Held-out test set: features of shape (n, D) and binary labels, 0 for
/// normal rows and 1 for abnormal rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSet {
    pub features: DMatrix<f64>,
    pub labels: Vec<u8>,
}

impl TestSet {
    pub fn new(features: DMatrix<f64>, labels: Vec<u8>) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(Error::EmptyTestSet);
        }
        if labels.len() != features.nrows() {
            return Err(Error::DimensionMismatch {
                expected: features.nrows(),
                actual: labels.len(),
            });
        }
        Ok(TestSet { features, labels })
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one evaluation (or the average over several trials).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Area under the ROC curve, positive label = 1.
    pub auc: f64,

    /// Total test time in seconds: the sum of the four stage buckets.
    pub test_time: f64,
}

/// Trial-repetition settings for the runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialConfig {
    /// Number of trials to average over. Must be at least 1.
    pub nums: usize,

    /// Average over `nums` trials when true; run exactly one trial when
    /// false.
    pub is_average: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        TrialConfig {
            nums: 20,
            is_average: true,
        }
    }
}

/// Runs the stage-isolated evaluation pipeline.
pub struct Evaluator {
    telemetry: Arc<dyn Telemetry>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new(log_telemetry())
    }
}

impl Evaluator {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Evaluator { telemetry }
    }

    /// Evaluates a rehydrated detector (behind an optional projection) on
    /// the test set, timing each stage independently.
    ///
    /// Stage order: standardization (a declared no-op, zero time), then
    /// projection (zero time when no projection is configured), then seek
    /// (a training-only concept, always zero at test time), then
    /// prediction. Inputs are never mutated.
    pub fn evaluate(
        &self,
        detector: &Detector,
        projection: Option<&Projection>,
        test_set: &TestSet,
    ) -> Result<Evaluation> {
        if test_set.is_empty() {
            return Err(Error::EmptyTestSet);
        }

        let mut clock = StageClock::new();

        // Standardization and seek are declared no-ops at test time; their
        // buckets stay at exactly zero rather than recording guard overhead.

        let projected;
        let features = match projection {
            Some(p) => {
                let guard = clock.enter(Stage::Project);
                projected = p.transform(&test_set.features)?;
                drop(guard);
                &projected
            }
            None => &test_set.features,
        };

        let scores = {
            let _guard = clock.enter(Stage::Predict);
            detector.decision_function(features)?
        };

        let curve = roc::roc_curve(&test_set.labels, &scores)?;
        let auc = roc::auc(&curve);

        self.telemetry.stage_breakdown(&clock);

        Ok(Evaluation {
            auc,
            test_time: clock.total_secs(),
        })
    }

    /// Repeat-averaged evaluation.
    ///
    /// Every trial operates on freshly cloned copies of the detector,
    /// projection, and test set, so no trial can observe state left over
    /// from a previous one. With `is_average` set, returns the arithmetic
    /// mean of AUC and total test time over `nums` trials; otherwise runs
    /// exactly one trial and returns its raw values.
    pub fn run_trials(
        &self,
        detector: &Detector,
        projection: Option<&Projection>,
        test_set: &TestSet,
        config: &TrialConfig,
    ) -> Result<Evaluation> {
        let nums = if config.is_average { config.nums.max(1) } else { 1 };

        let mut aucs = Vec::with_capacity(nums);
        let mut times = Vec::with_capacity(nums);
        for _ in 0..nums {
            let detector = detector.clone();
            let projection = projection.cloned();
            let test_set = test_set.clone();
            let evaluation = self.evaluate(&detector, projection.as_ref(), &test_set)?;
            aucs.push(evaluation.auc);
            times.push(evaluation.test_time);
        }

        Ok(Evaluation {
            auc: mean(&aucs),
            test_time: mean(&times),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

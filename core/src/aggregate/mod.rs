//! Repeat aggregation
//!
//! Training produces several independently persisted snapshot repeats of
//! every (detector, projection, dataset) combination; aggregating across
//! them measures variance across retrained instances. Each repeat is
//! rehydrated, evaluated through the trial runner, and its AUC, test time
//! and on-disk footprint appended to the report. A failing repeat is logged
//! with full context and skipped: it contributes zero entries, never a
//! placeholder, and never aborts the repeats after it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evaluation::{Evaluator, TestSet, TrialConfig};
use crate::model::{Detector, Projection};
use crate::snapshot::{ModelVariant, ParamSnapshot};
use crate::telemetry::{log_telemetry, Telemetry};

/// Unit for reporting deployed-footprint sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    Bytes,
    Kb,
    Mb,
}

impl SizeUnit {
    /// Scales a raw byte count into this unit.
    pub fn scale(self, bytes: u64) -> f64 {
        match self {
            SizeUnit::Bytes => bytes as f64,
            SizeUnit::Kb => bytes as f64 / 1e3,
            SizeUnit::Mb => bytes as f64 / 1e6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SizeUnit::Bytes => "B",
            SizeUnit::Kb => "KB",
            SizeUnit::Mb => "MB",
        }
    }
}

/// Raw on-disk sizes of one repeat's artifacts, used as a deployed-footprint
/// proxy. The model part covers both parameter mappings (detector +
/// projection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub model_bytes: u64,
    pub test_set_bytes: u64,
}

/// Where snapshot repeats come from.
///
/// The on-disk layout and extraction pipeline are owned by external
/// collaborators; the aggregator only needs this seam. The test set is
/// shared across all repeats of a run.
pub trait RepeatSource {
    fn repeats(&self) -> usize;

    fn detector_snapshot(&self, index: usize) -> Result<ParamSnapshot>;

    fn projection_snapshot(&self, index: usize) -> Result<ParamSnapshot>;

    fn test_set(&self) -> Result<TestSet>;

    fn footprint(&self, index: usize) -> Result<Footprint>;
}

/// Persisted test-set artifact encoding.
#[derive(Debug, Serialize, Deserialize)]
struct TestSetFile {
    features: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

/// Directory-backed repeat source over the trainer's file layout:
/// `repeat_{i}.model.model_params`, `repeat_{i}.model.project_params`, and
/// the shared `Test_set-repeat_0.dat`, all JSON-encoded. Footprints are the
/// artifact file sizes.
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
    repeats: usize,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>, repeats: usize) -> Self {
        DirSource {
            dir: dir.into(),
            repeats,
        }
    }

    fn model_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("repeat_{index}.model.model_params"))
    }

    fn projection_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("repeat_{index}.model.project_params"))
    }

    fn test_set_path(&self) -> PathBuf {
        self.dir.join("Test_set-repeat_0.dat")
    }
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

impl RepeatSource for DirSource {
    fn repeats(&self) -> usize {
        self.repeats
    }

    fn detector_snapshot(&self, index: usize) -> Result<ParamSnapshot> {
        ParamSnapshot::load(self.model_path(index))
    }

    fn projection_snapshot(&self, index: usize) -> Result<ParamSnapshot> {
        ParamSnapshot::load(self.projection_path(index))
    }

    fn test_set(&self) -> Result<TestSet> {
        let file = File::open(self.test_set_path())?;
        let raw: TestSetFile = serde_json::from_reader(BufReader::new(file))?;
        let nrows = raw.features.len();
        let ncols = raw.features.first().map_or(0, Vec::len);
        if raw.features.iter().any(|r| r.len() != ncols) {
            return Err(Error::malformed("features", "ragged feature rows"));
        }
        let features = DMatrix::from_fn(nrows, ncols, |i, j| raw.features[i][j]);
        TestSet::new(features, raw.labels)
    }

    fn footprint(&self, index: usize) -> Result<Footprint> {
        Ok(Footprint {
            model_bytes: file_size(&self.model_path(index))?
                + file_size(&self.projection_path(index))?,
            test_set_bytes: file_size(&self.test_set_path())?,
        })
    }
}

/// Mean and population standard deviation over the successful repeats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
}

impl Summary {
    /// `None` when no repeat produced a value: an empty list has no
    /// numerically defined mean and is reported as unavailable, never
    /// coerced to zero.
    pub fn of(values: &[f64]) -> Option<Summary> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Some(Summary {
            mean,
            std: var.sqrt(),
        })
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}+/-{:.2}", self.mean, self.std)
    }
}

/// Aggregate result record across repeats.
///
/// The lists hold exactly one entry per *successful* repeat; failed repeats
/// are never padded with placeholder values.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub tag: String,
    pub unit: SizeUnit,
    pub attempted: usize,
    pub aucs: Vec<f64>,
    pub test_times: Vec<f64>,
    pub model_spaces: Vec<f64>,
    pub test_spaces: Vec<f64>,
}

impl BenchReport {
    pub fn succeeded(&self) -> usize {
        self.aucs.len()
    }

    pub fn auc_summary(&self) -> Option<Summary> {
        Summary::of(&self.aucs)
    }

    pub fn test_time_summary(&self) -> Option<Summary> {
        Summary::of(&self.test_times)
    }

    pub fn model_space_summary(&self) -> Option<Summary> {
        Summary::of(&self.model_spaces)
    }

    pub fn test_space_summary(&self) -> Option<Summary> {
        Summary::of(&self.test_spaces)
    }
}

fn summary_line(name: &str, summary: Option<Summary>, unit: &str) -> String {
    match summary {
        Some(s) => format!("{name}: {s} {unit}"),
        None => format!("{name}: unavailable (no valid measurement) {unit}"),
    }
}

/// Runs the whole rehydrate-evaluate-average cycle across snapshot repeats.
pub struct Aggregator {
    tag: String,
    trial: TrialConfig,
    unit: SizeUnit,
    telemetry: Arc<dyn Telemetry>,
    evaluator: Evaluator,
}

impl Aggregator {
    pub fn new(tag: impl Into<String>) -> Self {
        Aggregator::with_telemetry(tag, log_telemetry())
    }

    pub fn with_telemetry(tag: impl Into<String>, telemetry: Arc<dyn Telemetry>) -> Self {
        Aggregator {
            tag: tag.into(),
            trial: TrialConfig::default(),
            unit: SizeUnit::Kb,
            telemetry: telemetry.clone(),
            evaluator: Evaluator::new(telemetry),
        }
    }

    pub fn trial_config(mut self, trial: TrialConfig) -> Self {
        self.trial = trial;
        self
    }

    pub fn size_unit(mut self, unit: SizeUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Processes every repeat the source offers and merges the survivors.
    ///
    /// Any error inside one repeat (load, unsupported variant, malformed
    /// snapshot, scoring) is reported through telemetry and the loop moves
    /// on; no repeat is retried. A run where every repeat failed yields
    /// empty lists whose summaries are `None`.
    pub fn run(&self, source: &impl RepeatSource) -> BenchReport {
        let mut report = BenchReport {
            tag: self.tag.clone(),
            unit: self.unit,
            attempted: source.repeats(),
            aucs: Vec::new(),
            test_times: Vec::new(),
            model_spaces: Vec::new(),
            test_spaces: Vec::new(),
        };

        for index in 0..source.repeats() {
            self.telemetry.repeat_started(index, &self.tag);
            match self.process_repeat(source, index) {
                Ok((evaluation, footprint)) => {
                    report.aucs.push(evaluation.auc);
                    report.test_times.push(evaluation.test_time);
                    report.model_spaces.push(self.unit.scale(footprint.model_bytes));
                    report.test_spaces.push(self.unit.scale(footprint.test_set_bytes));
                }
                Err(error) => self.telemetry.repeat_failed(index, &self.tag, &error),
            }
        }

        let unit = self.unit.label();
        self.telemetry.summary(&summary_line(
            "model_spaces",
            report.model_space_summary(),
            unit,
        ));
        self.telemetry
            .summary(&summary_line("auc", report.auc_summary(), ""));

        report
    }

    fn process_repeat(
        &self,
        source: &impl RepeatSource,
        index: usize,
    ) -> Result<(crate::evaluation::Evaluation, Footprint)> {
        let variant = ModelVariant::parse(&self.tag)?;

        let detector_snap = source.detector_snapshot(index)?;
        let detector = Detector::from_snapshot(variant.detector, &detector_snap)?;

        let projection = match variant.projection {
            Some(kind) => {
                let projection_snap = source.projection_snapshot(index)?;
                Some(Projection::from_snapshot(kind, &projection_snap)?)
            }
            None => None,
        };

        let footprint = source.footprint(index)?;
        let test_set = source.test_set()?;

        let evaluation =
            self.evaluator
                .run_trials(&detector, projection.as_ref(), &test_set, &self.trial)?;
        Ok((evaluation, footprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use crate::error::Error;
    use crate::snapshot::ParamValue;
    use crate::telemetry::capture::CaptureTelemetry;

    fn density_fields() -> ParamSnapshot {
        ParamSnapshot::from_fields([
            (
                "covariance_type".to_string(),
                ParamValue::Text("diag".to_string()),
            ),
            ("weights_".to_string(), ParamValue::Vector(vec![1.0])),
            ("means_".to_string(), ParamValue::Matrix(vec![vec![0.0, 0.0]])),
            (
                "precisions_cholesky_".to_string(),
                ParamValue::Matrix(vec![vec![1.0, 1.0]]),
            ),
        ])
    }

    fn shared_test_set() -> TestSet {
        TestSet::new(
            DMatrix::from_row_slice(4, 2, &[0.1, 0.0, -0.2, 0.1, 6.0, 6.0, -7.0, 5.0]),
            vec![0, 0, 1, 1],
        )
        .unwrap()
    }

    /// In-memory source; repeats listed in `broken` serve a snapshot with
    /// the weights field stripped.
    struct StubSource {
        repeats: usize,
        broken: Vec<usize>,
    }

    impl RepeatSource for StubSource {
        fn repeats(&self) -> usize {
            self.repeats
        }

        fn detector_snapshot(&self, index: usize) -> Result<ParamSnapshot> {
            let mut snap = density_fields();
            if self.broken.contains(&index) {
                snap = ParamSnapshot::from_fields([(
                    "covariance_type".to_string(),
                    ParamValue::Text("diag".to_string()),
                )]);
            }
            Ok(snap)
        }

        fn projection_snapshot(&self, _index: usize) -> Result<ParamSnapshot> {
            Ok(ParamSnapshot::new())
        }

        fn test_set(&self) -> Result<TestSet> {
            Ok(shared_test_set())
        }

        fn footprint(&self, _index: usize) -> Result<Footprint> {
            Ok(Footprint {
                model_bytes: 2_000,
                test_set_bytes: 10_000,
            })
        }
    }

    fn fast_trials() -> TrialConfig {
        TrialConfig { nums: 2, is_average: true }
    }

    #[test]
    fn test_failed_repeat_contributes_zero_entries() {
        let telemetry = Arc::new(CaptureTelemetry::default());
        let aggregator = Aggregator::with_telemetry("GMM(diag)", telemetry.clone())
            .trial_config(fast_trials());
        let source = StubSource { repeats: 5, broken: vec![2] };

        let report = aggregator.run(&source);

        assert_eq!(report.attempted, 5);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.aucs.len(), 4);
        assert_eq!(report.test_times.len(), 4);

        // The failure was logged, and repeats 3 and 4 still ran.
        let lines = telemetry.lines();
        assert!(lines.iter().any(|l| l.starts_with("failed 2")));
        assert!(lines.iter().any(|l| l.starts_with("started 3")));
        assert!(lines.iter().any(|l| l.starts_with("started 4")));
    }

    #[test]
    fn test_fully_failed_run_reports_unavailable() {
        let telemetry = Arc::new(CaptureTelemetry::default());
        let aggregator = Aggregator::with_telemetry("GMM(diag)", telemetry.clone())
            .trial_config(fast_trials());
        let source = StubSource { repeats: 3, broken: vec![0, 1, 2] };

        let report = aggregator.run(&source);

        assert_eq!(report.succeeded(), 0);
        assert!(report.auc_summary().is_none());
        assert!(report.model_space_summary().is_none());
        assert!(telemetry
            .lines()
            .iter()
            .any(|l| l.contains("unavailable")));
    }

    #[test]
    fn test_unsupported_tag_fails_every_repeat() {
        let telemetry = Arc::new(CaptureTelemetry::default());
        let aggregator = Aggregator::with_telemetry("IF-AE(latent)", telemetry.clone())
            .trial_config(fast_trials());
        let source = StubSource { repeats: 2, broken: vec![] };

        let report = aggregator.run(&source);
        assert_eq!(report.succeeded(), 0);
        assert_eq!(
            telemetry
                .lines()
                .iter()
                .filter(|l| l.starts_with("failed"))
                .count(),
            2
        );
    }

    #[test]
    fn test_footprints_are_unit_scaled() {
        let aggregator = Aggregator::new("GMM(diag)")
            .trial_config(fast_trials())
            .size_unit(SizeUnit::Kb);
        let report = aggregator.run(&StubSource { repeats: 2, broken: vec![] });

        assert_eq!(report.model_spaces, vec![2.0, 2.0]);
        assert_eq!(report.test_spaces, vec![10.0, 10.0]);
    }

    #[test]
    fn test_summary_mean_and_population_std() {
        let s = Summary::of(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(s.mean, 2.5, epsilon = 1e-12);
        assert_relative_eq!(s.std, (1.25f64).sqrt(), epsilon = 1e-12);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_size_unit_scaling() {
        assert_eq!(SizeUnit::Bytes.scale(1_500), 1_500.0);
        assert_eq!(SizeUnit::Kb.scale(1_500), 1.5);
        assert_eq!(SizeUnit::Mb.scale(1_500_000), 1.5);
    }

    #[test]
    fn test_dir_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        for index in 0..2 {
            density_fields()
                .save(dir.path().join(format!("repeat_{index}.model.model_params")))
                .unwrap();
            ParamSnapshot::new()
                .save(dir.path().join(format!("repeat_{index}.model.project_params")))
                .unwrap();
        }
        let test_set = TestSetFile {
            features: vec![
                vec![0.1, 0.0],
                vec![-0.2, 0.1],
                vec![6.0, 6.0],
                vec![-7.0, 5.0],
            ],
            labels: vec![0, 0, 1, 1],
        };
        let file = File::create(dir.path().join("Test_set-repeat_0.dat")).unwrap();
        serde_json::to_writer(file, &test_set).unwrap();

        let source = DirSource::new(dir.path(), 2);
        assert_eq!(source.repeats(), 2);
        let loaded = source.test_set().unwrap();
        assert_eq!(loaded.len(), 4);

        let footprint = source.footprint(0).unwrap();
        assert!(footprint.model_bytes > 0);
        assert!(footprint.test_set_bytes > 0);

        let report = Aggregator::new("GMM(diag)")
            .trial_config(fast_trials())
            .run(&source);
        assert_eq!(report.succeeded(), 2);
        assert_relative_eq!(report.auc_summary().unwrap().mean, 1.0, epsilon = 1e-12);
        assert_relative_eq!(report.auc_summary().unwrap().std, 0.0, epsilon = 1e-12);

        // A missing repeat file is a per-repeat failure, not a crash.
        let short = DirSource::new(dir.path(), 3);
        let report = Aggregator::new("GMM(diag)")
            .trial_config(fast_trials())
            .run(&short);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn test_ragged_test_set_rows_are_malformed_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Test_set-repeat_0.dat"),
            r#"{"features": [[0.1, 0.2], [0.3]], "labels": [0, 1]}"#,
        )
        .unwrap();

        let source = DirSource::new(dir.path(), 1);
        let err = source.test_set().unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot { .. }));

        // The bad artifact stays inside the per-repeat boundary: the
        // aggregator logs the failure and finishes with zero entries.
        density_fields()
            .save(dir.path().join("repeat_0.model.model_params"))
            .unwrap();
        ParamSnapshot::new()
            .save(dir.path().join("repeat_0.model.project_params"))
            .unwrap();
        let telemetry = Arc::new(CaptureTelemetry::default());
        let report = Aggregator::with_telemetry("GMM(diag)", telemetry.clone())
            .trial_config(fast_trials())
            .run(&source);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded(), 0);
        assert!(telemetry.lines().iter().any(|l| l.starts_with("failed 0")));
    }

    #[test]
    fn test_missing_file_yields_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirSource::new(dir.path(), 1);
        assert!(matches!(
            source.detector_snapshot(0).unwrap_err(),
            Error::Io(_)
        ));
    }
}

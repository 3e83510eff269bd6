//! End-to-end synthetic run: rehydrate a KJL-projected density detector
//! from in-memory snapshots and aggregate five repeats.
//!
//! Run with `RUST_LOG=debug cargo run --example synthetic` to see the
//! per-stage breakdown and the aggregate summary lines.

use nalgebra::DMatrix;

use rehydra_core::aggregate::{Aggregator, Footprint, RepeatSource, SizeUnit};
use rehydra_core::evaluation::{TestSet, TrialConfig};
use rehydra_core::snapshot::{ParamSnapshot, ParamValue};
use rehydra_core::Result;

/// In-memory stand-in for the trainer's snapshot directory.
struct SyntheticSource {
    detector: ParamSnapshot,
    projection: ParamSnapshot,
    test_set: TestSet,
}

impl RepeatSource for SyntheticSource {
    fn repeats(&self) -> usize {
        5
    }

    fn detector_snapshot(&self, _index: usize) -> Result<ParamSnapshot> {
        Ok(self.detector.clone())
    }

    fn projection_snapshot(&self, _index: usize) -> Result<ParamSnapshot> {
        Ok(self.projection.clone())
    }

    fn test_set(&self) -> Result<TestSet> {
        Ok(self.test_set.clone())
    }

    fn footprint(&self, _index: usize) -> Result<Footprint> {
        Ok(Footprint {
            model_bytes: 4_096,
            test_set_bytes: 65_536,
        })
    }
}

fn synthetic_source() -> Result<SyntheticSource> {
    // Projection: two reference rows in the raw 3-d space, basis mapping
    // the gram down to k = 2.
    let projection = ParamSnapshot::from_fields([
        ("sigma".to_string(), ParamValue::Scalar(2.0)),
        (
            "Xrow".to_string(),
            ParamValue::Matrix(vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]]),
        ),
        (
            "U".to_string(),
            ParamValue::Matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
        ),
    ]);

    // Density detector over the projected space: one component near the
    // gram values that normal rows land on.
    let detector = ParamSnapshot::from_fields([
        (
            "covariance_type".to_string(),
            ParamValue::Text("diag".to_string()),
        ),
        ("weights_".to_string(), ParamValue::Vector(vec![1.0])),
        (
            "means_".to_string(),
            ParamValue::Matrix(vec![vec![0.95, 0.5]]),
        ),
        (
            "precisions_cholesky_".to_string(),
            ParamValue::Matrix(vec![vec![10.0, 10.0]]),
        ),
    ]);

    // Normal rows cluster near the origin; abnormal rows sit far away and
    // project to near-zero gram values.
    let features = DMatrix::from_row_slice(
        6,
        3,
        &[
            0.1, 0.0, -0.1, //
            -0.2, 0.1, 0.0, //
            0.0, 0.2, 0.1, //
            8.0, 8.0, 8.0, //
            -9.0, 7.0, 8.0, //
            10.0, -10.0, 9.0, //
        ],
    );
    let labels = vec![0, 0, 0, 1, 1, 1];

    Ok(SyntheticSource {
        detector,
        projection,
        test_set: TestSet::new(features, labels)?,
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let source = synthetic_source()?;
    let report = Aggregator::new("KJL-GMM(diag)")
        .trial_config(TrialConfig::default())
        .size_unit(SizeUnit::Kb)
        .run(&source);

    println!(
        "{}: {}/{} repeats succeeded",
        report.tag,
        report.succeeded(),
        report.attempted
    );
    match report.auc_summary() {
        Some(auc) => println!("auc: {auc}"),
        None => println!("auc: unavailable (no valid measurement)"),
    }
    match report.test_time_summary() {
        Some(t) => println!("test_time: {t} s"),
        None => println!("test_time: unavailable"),
    }
    match report.model_space_summary() {
        Some(s) => println!("model_space: {} {}", s, report.unit.label()),
        None => println!("model_space: unavailable"),
    }
    println!("{}", serde_json::to_string_pretty(&report).map_err(rehydra_core::Error::Decode)?);

    Ok(())
}

//! REHYDRA Core: Snapshot Rehydration Observatory
//!
//! This crate benchmarks previously trained anomaly-detection models,
//! together with their dimensionality-reduction front-ends, by rehydrating
//! them purely from persisted flat parameter snapshots (never from the
//! original training objects), applying them to a held-out test set, and
//! measuring both detection quality (area under the ROC curve) and
//! per-stage inference latency with high-resolution, stage-isolated timing.
//!
//! # Architecture
//!
//! The pipeline is layered leaves-first:
//!
//! - [`snapshot`]: the persisted parameter mapping, its typed accessors,
//!   and the variant-tag factory selecting detector/projection kinds.
//! - [`model`]: rehydrated [`Projection`](model::Projection) and
//!   [`Detector`](model::Detector) value objects; pure field copies, no
//!   fitting logic ever executes.
//! - [`evaluation`]: the stage-isolated [`Evaluator`](evaluation::Evaluator)
//!   (standardize, project, seek, predict; ROC/AUC with positive label 1)
//!   and the copy-per-trial averaging runner.
//! - [`aggregate`]: the [`Aggregator`](aggregate::Aggregator) merging
//!   results across independently persisted snapshot repeats behind a
//!   per-repeat failure boundary.
//! - [`telemetry`]: the explicit logging handle the evaluator and
//!   aggregator own, defaulting to the `log` facade.
//!
//! The core is fully single-threaded and synchronous: trial isolation is
//! achieved by copying, not locking, trading raw throughput for measurement
//! purity.

pub mod aggregate;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod snapshot;
pub mod telemetry;

pub use crate::aggregate::{
    Aggregator, BenchReport, DirSource, Footprint, RepeatSource, SizeUnit, Summary,
};
pub use crate::error::{Error, Result};
pub use crate::evaluation::{Evaluation, Evaluator, TestSet, TrialConfig};
pub use crate::model::{Detector, Projection};
pub use crate::snapshot::{DetectorKind, ModelVariant, ParamSnapshot, ParamValue, ProjectionKind};
pub use crate::telemetry::{LogTelemetry, Telemetry};

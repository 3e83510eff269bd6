//! Rehydrated model objects
//!
//! Projections and detectors are value objects: built once per snapshot by
//! pure field copying, never mutated afterwards, and cloned wholesale when
//! the trial runner wants an isolated copy. Nothing in this module fits,
//! trains, or adapts; the parameters on disk are the model.

pub mod detector;
pub mod projection;

pub use self::detector::{CovarianceStructure, Detector, MarginKernel};
pub use self::projection::Projection;

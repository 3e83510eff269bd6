//! Rehydrated anomaly detectors
//!
//! Two detector kinds are supported, matching what the trainers persist: a
//! kernel-margin scorer rebuilt from support vectors, dual coefficients and
//! an intercept, and a Gaussian-mixture scorer rebuilt from mixture weights,
//! component means and per-component precision Cholesky factors.
//!
//! # Score orientation
//!
//! Both kinds return one score per row with the invariant that a **larger
//! score means more abnormal**. ROC computation downstream fixes the
//! positive label to 1 (abnormal), so both detectors negate their natural
//! normality score: the margin scorer returns the negated signed margin and
//! the density scorer returns the negated mixture log-likelihood.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::snapshot::{DetectorKind, ParamSnapshot};

/// Kernel family for the margin detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginKernel {
    /// Gaussian RBF kernel parameterized by gamma.
    Rbf,

    /// Plain inner product; gamma is carried but unused.
    Linear,
}

impl MarginKernel {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "rbf" => Ok(MarginKernel::Rbf),
            "linear" => Ok(MarginKernel::Linear),
            other => Err(Error::malformed(
                "kernel",
                format!("unknown kernel name {other:?}"),
            )),
        }
    }
}

/// Covariance structure tag of the density detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceStructure {
    /// Full (k, k) covariance per component.
    Full,

    /// Diagonal covariance per component.
    Diag,
}

impl CovarianceStructure {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "full" => Ok(CovarianceStructure::Full),
            "diag" => Ok(CovarianceStructure::Diag),
            other => Err(Error::malformed(
                "covariance_type",
                format!("unknown covariance structure {other:?}"),
            )),
        }
    }
}

/// Per-component precision Cholesky factors, shaped by the covariance
/// structure they were persisted under.
#[derive(Debug, Clone, PartialEq)]
pub enum PrecisionsCholesky {
    /// One (k, k) factor L per component, with precision = L L^T.
    Full(Vec<DMatrix<f64>>),

    /// (c, k) matrix of per-dimension reciprocal standard deviations.
    Diag(DMatrix<f64>),
}

/// A rehydrated detector, ready to score test rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Detector {
    /// Support-vector kernel-margin scorer.
    Margin {
        kernel: MarginKernel,
        gamma: f64,
        support_vectors: DMatrix<f64>,
        dual_coefs: DVector<f64>,
        intercept: f64,
    },

    /// Gaussian-mixture log-likelihood scorer.
    Density {
        covariance: CovarianceStructure,
        weights: DVector<f64>,
        means: DMatrix<f64>,
        precisions_cholesky: PrecisionsCholesky,
    },
}

impl Detector {
    /// Rehydrates a detector from its persisted field mapping.
    ///
    /// Field copying only; the field names are the trainer's own. The gamma
    /// field is required for both margin kernels because the trainer always
    /// persists it, even though the linear kernel never reads it.
    pub fn from_snapshot(kind: DetectorKind, snap: &ParamSnapshot) -> Result<Self> {
        match kind {
            DetectorKind::Margin => {
                let kernel = MarginKernel::parse(snap.field("kernel")?.text("kernel")?)?;
                let support_vectors = snap
                    .field("support_vectors_")?
                    .matrix("support_vectors_")?;
                let dual_coefs = snap.field("_dual_coef_")?.vector("_dual_coef_")?;
                if dual_coefs.len() != support_vectors.nrows() {
                    return Err(Error::malformed(
                        "_dual_coef_",
                        format!(
                            "{} coefficients for {} support vectors",
                            dual_coefs.len(),
                            support_vectors.nrows()
                        ),
                    ));
                }
                Ok(Detector::Margin {
                    kernel,
                    gamma: snap.field("_gamma")?.scalar("_gamma")?,
                    support_vectors,
                    dual_coefs,
                    intercept: snap.field("_intercept_")?.scalar("_intercept_")?,
                })
            }
            DetectorKind::Density => {
                let covariance =
                    CovarianceStructure::parse(snap.field("covariance_type")?.text("covariance_type")?)?;
                let weights = snap.field("weights_")?.vector("weights_")?;
                let means = snap.field("means_")?.matrix("means_")?;
                let precisions_cholesky =
                    Self::rehydrate_precisions(covariance, snap, weights.len(), means.ncols())?;
                if means.nrows() != weights.len() {
                    return Err(Error::malformed(
                        "means_",
                        format!("{} means for {} weights", means.nrows(), weights.len()),
                    ));
                }
                Ok(Detector::Density {
                    covariance,
                    weights,
                    means,
                    precisions_cholesky,
                })
            }
        }
    }

    fn rehydrate_precisions(
        covariance: CovarianceStructure,
        snap: &ParamSnapshot,
        components: usize,
        dim: usize,
    ) -> Result<PrecisionsCholesky> {
        let field = "precisions_cholesky_";
        match covariance {
            CovarianceStructure::Full => {
                let factors = snap.field(field)?.tensor(field)?;
                if factors.len() != components {
                    return Err(Error::malformed(
                        field,
                        format!("{} factors for {components} components", factors.len()),
                    ));
                }
                for factor in &factors {
                    if factor.nrows() != dim || factor.ncols() != dim {
                        return Err(Error::malformed(
                            field,
                            format!(
                                "factor is {}x{}, expected {dim}x{dim}",
                                factor.nrows(),
                                factor.ncols()
                            ),
                        ));
                    }
                }
                Ok(PrecisionsCholesky::Full(factors))
            }
            CovarianceStructure::Diag => {
                let diag = snap.field(field)?.matrix(field)?;
                if diag.nrows() != components || diag.ncols() != dim {
                    return Err(Error::malformed(
                        field,
                        format!(
                            "diagonal factors are {}x{}, expected {components}x{dim}",
                            diag.nrows(),
                            diag.ncols()
                        ),
                    ));
                }
                Ok(PrecisionsCholesky::Diag(diag))
            }
        }
    }

    /// Working dimension the detector expects its input rows to have.
    pub fn input_dim(&self) -> usize {
        match self {
            Detector::Margin { support_vectors, .. } => support_vectors.ncols(),
            Detector::Density { means, .. } => means.ncols(),
        }
    }

    /// Scores a batch of shape (n, k): one score per row, larger meaning
    /// more abnormal. Deterministic; never mutates the detector or input.
    pub fn decision_function(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        if x.ncols() != self.input_dim() {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim(),
                actual: x.ncols(),
            });
        }
        match self {
            Detector::Margin {
                kernel,
                gamma,
                support_vectors,
                dual_coefs,
                intercept,
            } => Ok(margin_scores(
                *kernel,
                *gamma,
                support_vectors,
                dual_coefs,
                *intercept,
                x,
            )),
            Detector::Density {
                weights,
                means,
                precisions_cholesky,
                ..
            } => Ok(density_scores(weights, means, precisions_cholesky, x)),
        }
    }
}

/// Negated signed margin: -(sum_i alpha_i k(sv_i, x) + b).
fn margin_scores(
    kernel: MarginKernel,
    gamma: f64,
    support_vectors: &DMatrix<f64>,
    dual_coefs: &DVector<f64>,
    intercept: f64,
    x: &DMatrix<f64>,
) -> DVector<f64> {
    DVector::from_fn(x.nrows(), |row, _| {
        let mut margin = intercept;
        for s in 0..support_vectors.nrows() {
            let k = match kernel {
                MarginKernel::Rbf => {
                    let mut sq_dist = 0.0;
                    for c in 0..x.ncols() {
                        let d = x[(row, c)] - support_vectors[(s, c)];
                        sq_dist += d * d;
                    }
                    (-gamma * sq_dist).exp()
                }
                MarginKernel::Linear => {
                    let mut dot = 0.0;
                    for c in 0..x.ncols() {
                        dot += x[(row, c)] * support_vectors[(s, c)];
                    }
                    dot
                }
            };
            margin += dual_coefs[s] * k;
        }
        -margin
    })
}

/// Negated mixture log-likelihood via the precision Cholesky factors.
fn density_scores(
    weights: &DVector<f64>,
    means: &DMatrix<f64>,
    precisions: &PrecisionsCholesky,
    x: &DMatrix<f64>,
) -> DVector<f64> {
    let dim = means.ncols() as f64;
    let norm_const = -0.5 * dim * (2.0 * PI).ln();

    DVector::from_fn(x.nrows(), |row, _| {
        let mut weighted_log_probs = Vec::with_capacity(weights.len());
        for c in 0..weights.len() {
            let (log_det, mahalanobis_sq) = match precisions {
                PrecisionsCholesky::Full(factors) => {
                    let factor = &factors[c];
                    let log_det: f64 = (0..factor.nrows()).map(|i| factor[(i, i)].ln()).sum();
                    // y = (x - mu)^T L, precision = L L^T
                    let mut sq = 0.0;
                    for j in 0..factor.ncols() {
                        let mut y = 0.0;
                        for i in 0..factor.nrows() {
                            y += (x[(row, i)] - means[(c, i)]) * factor[(i, j)];
                        }
                        sq += y * y;
                    }
                    (log_det, sq)
                }
                PrecisionsCholesky::Diag(diag) => {
                    let mut log_det = 0.0;
                    let mut sq = 0.0;
                    for i in 0..diag.ncols() {
                        log_det += diag[(c, i)].ln();
                        let y = (x[(row, i)] - means[(c, i)]) * diag[(c, i)];
                        sq += y * y;
                    }
                    (log_det, sq)
                }
            };
            let log_prob = norm_const + log_det - 0.5 * mahalanobis_sq;
            weighted_log_probs.push(weights[c].ln() + log_prob);
        }
        -log_sum_exp(&weighted_log_probs)
    })
}

/// Numerically stable log(sum(exp(v))).
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

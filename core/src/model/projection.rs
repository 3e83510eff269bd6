//! Dimensionality-reduction front-ends
//!
//! Both supported projections carry the same rehydrated geometry: a kernel
//! bandwidth `sigma`, a reference row sample `Xrow` drawn from the training
//! set, and a basis matrix. Transforming a batch recomputes the Gaussian
//! gram between the batch and `Xrow`, then pushes it through the basis. The
//! two kinds differ only in how the basis was derived at training time: a
//! random kernel sketch (KJL) versus an eigendecomposition product (Nystrom)
//! persisted pre-combined. At test time they share one code path per
//! operation and stay strictly deterministic.

use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::snapshot::{ParamSnapshot, ProjectionKind};

/// A rehydrated dimensionality-reduction transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// KJL-style kernel projection; `basis` is the persisted sketch matrix U.
    Kernel {
        sigma: f64,
        xrow: DMatrix<f64>,
        basis: DMatrix<f64>,
    },

    /// Nystrom-style spectral projection; `basis` is the persisted
    /// eigenvector / eigenvalue product.
    Spectral {
        sigma: f64,
        xrow: DMatrix<f64>,
        basis: DMatrix<f64>,
    },
}

impl Projection {
    /// Rehydrates a projection from its persisted field mapping.
    ///
    /// Field copying only; the basis field name differs per kind (`U` for
    /// kernel, `eigvec_lambda` for spectral) because the snapshots persist
    /// what the trainer computed, under the trainer's names.
    pub fn from_snapshot(kind: ProjectionKind, snap: &ParamSnapshot) -> Result<Self> {
        let sigma = snap.field("sigma")?.scalar("sigma")?;
        let xrow = snap.field("Xrow")?.matrix("Xrow")?;
        let projection = match kind {
            ProjectionKind::Kernel => Projection::Kernel {
                sigma,
                xrow,
                basis: snap.field("U")?.matrix("U")?,
            },
            ProjectionKind::Spectral => Projection::Spectral {
                sigma,
                xrow,
                basis: snap.field("eigvec_lambda")?.matrix("eigvec_lambda")?,
            },
        };
        projection.check_geometry()?;
        Ok(projection)
    }

    fn check_geometry(&self) -> Result<()> {
        let (xrow, basis) = self.parts();
        if xrow.nrows() != basis.nrows() {
            return Err(Error::malformed(
                "basis",
                format!(
                    "basis has {} rows but Xrow has {} reference rows",
                    basis.nrows(),
                    xrow.nrows()
                ),
            ));
        }
        Ok(())
    }

    fn parts(&self) -> (&DMatrix<f64>, &DMatrix<f64>) {
        match self {
            Projection::Kernel { xrow, basis, .. } | Projection::Spectral { xrow, basis, .. } => {
                (xrow, basis)
            }
        }
    }

    pub fn sigma(&self) -> f64 {
        match self {
            Projection::Kernel { sigma, .. } | Projection::Spectral { sigma, .. } => *sigma,
        }
    }

    /// Width of the reduced space, fixed by the basis.
    pub fn output_dim(&self) -> usize {
        self.parts().1.ncols()
    }

    /// Projects a raw feature batch of shape (n, D) down to (n, k).
    ///
    /// Recomputes the Gaussian gram against the reference rows and applies
    /// the basis. No state advances; identical inputs always yield
    /// identical output.
    pub fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let (xrow, basis) = self.parts();
        if x.ncols() != xrow.ncols() {
            return Err(Error::DimensionMismatch {
                expected: xrow.ncols(),
                actual: x.ncols(),
            });
        }
        let gram = gaussian_gram(x, xrow, self.sigma());
        Ok(gram * basis)
    }
}

/// Gaussian gram matrix between row sets: K[i, j] = exp(-||x_i - y_j||^2 / sigma^2).
pub fn gaussian_gram(x: &DMatrix<f64>, y: &DMatrix<f64>, sigma: f64) -> DMatrix<f64> {
    let inv_sigma_sq = 1.0 / (sigma * sigma);
    DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        let mut sq_dist = 0.0;
        for c in 0..x.ncols() {
            let d = x[(i, c)] - y[(j, c)];
            sq_dist += d * d;
        }
        (-sq_dist * inv_sigma_sq).exp()
    })
}

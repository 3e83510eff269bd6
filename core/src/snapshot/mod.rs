//! Persisted parameter snapshots and variant dispatch
//!
//! A snapshot is an immutable flat mapping of named fields (scalars, text,
//! and numeric arrays) extracted from a trained model, plus a variant tag
//! string recorded alongside it. Rehydration copies fields out of the
//! mapping into typed model objects; no fitting logic ever runs here, so the
//! benchmark downstream measures only deployed-model cost.
//!
//! The variant tag is parsed once into an explicit [`ModelVariant`]
//! (detector kind plus optional projection kind) and every constructor is
//! keyed off that enum. A tag that names no known detector kind fails with
//! [`Error::UnsupportedVariant`] rather than falling through to a no-op
//! default.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single persisted field value.
///
/// Snapshots are untyped at rest; the expected shape of each field is fixed
/// by the variant that produced it, and the typed accessors below enforce it
/// at rehydration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Scalar parameter (bandwidth, intercept, ...).
    Scalar(f64),

    /// Textual parameter (kernel name, covariance structure tag).
    Text(String),

    /// Rank-1 array (dual coefficients, mixture weights).
    Vector(Vec<f64>),

    /// Rank-2 array (support vectors, reference rows, bases, means).
    Matrix(Vec<Vec<f64>>),

    /// Rank-3 array (per-component precision Cholesky factors).
    Tensor(Vec<Vec<Vec<f64>>>),
}

impl ParamValue {
    pub fn scalar(&self, field: &str) -> Result<f64> {
        match self {
            ParamValue::Scalar(v) => Ok(*v),
            other => Err(Error::malformed(field, format!("expected scalar, got {}", other.shape_name()))),
        }
    }

    pub fn text(&self, field: &str) -> Result<&str> {
        match self {
            ParamValue::Text(s) => Ok(s),
            other => Err(Error::malformed(field, format!("expected text, got {}", other.shape_name()))),
        }
    }

    pub fn vector(&self, field: &str) -> Result<DVector<f64>> {
        match self {
            ParamValue::Vector(v) => Ok(DVector::from_column_slice(v)),
            other => Err(Error::malformed(field, format!("expected vector, got {}", other.shape_name()))),
        }
    }

    /// Converts a rank-2 value into a dense row-major matrix. Ragged rows
    /// are a malformed snapshot, not a truncation.
    pub fn matrix(&self, field: &str) -> Result<DMatrix<f64>> {
        match self {
            ParamValue::Matrix(rows) => rows_to_matrix(rows, field),
            other => Err(Error::malformed(field, format!("expected matrix, got {}", other.shape_name()))),
        }
    }

    /// Converts a rank-3 value into one matrix per leading index.
    pub fn tensor(&self, field: &str) -> Result<Vec<DMatrix<f64>>> {
        match self {
            ParamValue::Tensor(blocks) => blocks
                .iter()
                .map(|rows| rows_to_matrix(rows, field))
                .collect(),
            other => Err(Error::malformed(field, format!("expected rank-3 tensor, got {}", other.shape_name()))),
        }
    }

    fn shape_name(&self) -> &'static str {
        match self {
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Text(_) => "text",
            ParamValue::Vector(_) => "vector",
            ParamValue::Matrix(_) => "matrix",
            ParamValue::Tensor(_) => "tensor",
        }
    }
}

fn rows_to_matrix(rows: &[Vec<f64>], field: &str) -> Result<DMatrix<f64>> {
    if rows.is_empty() {
        return Err(Error::malformed(field, "matrix has no rows"));
    }
    let ncols = rows[0].len();
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(Error::malformed(field, "ragged matrix rows"));
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

/// Immutable flat mapping of field name to persisted value.
///
/// For a given variant tag the expected field set is fixed and total: a
/// missing field is always [`Error::MalformedSnapshot`], never a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    fields: BTreeMap<String, ParamValue>,
}

impl ParamSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: impl IntoIterator<Item = (String, ParamValue)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.fields.insert(name.into(), value);
    }

    /// Looks up a required field.
    pub fn field(&self, name: &str) -> Result<&ParamValue> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::malformed(name, "required field missing"))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decodes a snapshot from its persisted JSON encoding.
    pub fn from_json_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Detector kinds the rehydration protocol understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    /// Support-vector kernel-margin scorer (OCSVM family).
    Margin,

    /// Gaussian-mixture log-likelihood scorer (GMM family).
    Density,
}

/// Dimensionality-reduction kinds the rehydration protocol understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Kernel Johnson-Lindenstrauss style projection (KJL).
    Kernel,

    /// Nystrom eigendecomposition-derived projection.
    Spectral,
}

/// Parsed variant tag: which detector a snapshot belongs to, and which
/// projection front-end (if any) it was trained behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVariant {
    pub detector: DetectorKind,
    pub projection: Option<ProjectionKind>,
}

impl ModelVariant {
    /// Parses a variant tag such as `"KJL-GMM(full)"` or `"OCSVM(rbf)"`.
    ///
    /// Membership is decided by substring: `OCSVM` selects the margin
    /// detector, `GMM` the density detector, `KJL` the kernel projection,
    /// `Nystrom` the spectral projection. A tag naming no detector kind is
    /// rejected; the projection part is genuinely optional.
    pub fn parse(tag: &str) -> Result<Self> {
        let detector = if tag.contains("OCSVM") {
            DetectorKind::Margin
        } else if tag.contains("GMM") {
            DetectorKind::Density
        } else {
            return Err(Error::UnsupportedVariant { tag: tag.to_string() });
        };

        let projection = if tag.contains("KJL") {
            Some(ProjectionKind::Kernel)
        } else if tag.contains("Nystrom") {
            Some(ProjectionKind::Spectral)
        } else {
            None
        };

        Ok(ModelVariant { detector, projection })
    }
}

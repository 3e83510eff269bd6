//! ROC curve and AUC
//!
//! Positive label is fixed to 1 (abnormal). The curve is produced by
//! sweeping the decision threshold from the highest score to the lowest;
//! rows sharing a score enter the confusion counts together, so ties form a
//! single operating point. AUC is the trapezoidal area under the resulting
//! (false-positive-rate, true-positive-rate) sequence.

use nalgebra::DVector;

use crate::error::{Error, Result};

/// Computes the ROC operating points for binary labels and abnormality
/// scores, starting at (0, 0) and ending at (1, 1).
pub fn roc_curve(labels: &[u8], scores: &DVector<f64>) -> Result<Vec<(f64, f64)>> {
    if labels.len() != scores.len() {
        return Err(Error::DimensionMismatch {
            expected: labels.len(),
            actual: scores.len(),
        });
    }

    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::DegenerateLabels { positives, negatives });
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = Vec::with_capacity(labels.len() + 1);
    curve.push((0.0, 0.0));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut i = 0;
    while i < order.len() {
        // consume the whole tie group before emitting a point
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if labels[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.push((fp as f64 / negatives as f64, tp as f64 / positives as f64));
    }

    Ok(curve)
}

/// Trapezoidal area under an ROC operating-point sequence.
pub fn auc(curve: &[(f64, f64)]) -> f64 {
    curve
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) * 0.5)
        .sum()
}

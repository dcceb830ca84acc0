//! Classification losses
//!
//! Losses work on a batch of logits `(N, K)` and hard class targets `(N,)`.
//! They return per-sample values so callers can mix two label sets with
//! per-sample or scalar coefficients, and produce the gradient of any
//! per-sample-weighted sum of those values.

mod bi_tempered;
mod cross_entropy;
mod traits;

pub use bi_tempered::{exp_t, log_t, tempered_softmax, BiTemperedLoss};
pub use cross_entropy::{log_softmax_rows, CrossEntropyLoss};
pub use traits::LossFn;

use crate::{Error, Result};
use ndarray::{Array1, Array2};

/// Ensure targets line up with logits rows and address valid classes
pub(crate) fn check_targets(logits: &Array2<f32>, targets: &Array1<usize>) -> Result<()> {
    if logits.nrows() != targets.len() {
        return Err(Error::ShapeMismatch(format!(
            "logits have {} rows, targets have {} entries",
            logits.nrows(),
            targets.len()
        )));
    }
    let classes = logits.ncols();
    if let Some(&bad) = targets.iter().find(|&&t| t >= classes) {
        return Err(Error::ShapeMismatch(format!(
            "target class {bad} out of range for {classes} outputs"
        )));
    }
    Ok(())
}

pub(crate) fn check_weights(targets: &Array1<usize>, weights: &Array1<f32>) -> Result<()> {
    if weights.len() != targets.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} loss weights for {} samples",
            weights.len(),
            targets.len()
        )));
    }
    Ok(())
}

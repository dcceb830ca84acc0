//! Cross Entropy Loss for classification

use super::{check_targets, check_weights, LossFn};
use crate::Result;
use ndarray::{Array1, Array2, Axis};

/// Row-wise log-softmax
pub fn log_softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|v| v - log_sum);
    }
    out
}

/// Cross Entropy Loss over hard targets
///
/// L_i = -log(softmax(logits_i)[target_i])
///
/// # Example
///
/// ```
/// use afinar::train::{CrossEntropyLoss, LossFn};
/// use ndarray::{arr1, arr2};
///
/// let loss = CrossEntropyLoss.mean(&arr2(&[[2.0, 1.0, 0.5]]), &arr1(&[0])).unwrap();
/// assert!(loss > 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl LossFn for CrossEntropyLoss {
    fn per_sample(&self, logits: &Array2<f32>, targets: &Array1<usize>) -> Result<Array1<f32>> {
        check_targets(logits, targets)?;
        let log_probs = log_softmax_rows(logits);
        Ok(targets
            .iter()
            .enumerate()
            .map(|(i, &t)| -log_probs[[i, t]])
            .collect())
    }

    fn backward(
        &self,
        logits: &Array2<f32>,
        targets: &Array1<usize>,
        weights: &Array1<f32>,
    ) -> Result<Array2<f32>> {
        check_targets(logits, targets)?;
        check_weights(targets, weights)?;

        // d(CE)/d(logits) = softmax - onehot
        let mut grad = log_softmax_rows(logits).mapv(f32::exp);
        for (i, mut row) in grad.axis_iter_mut(Axis(0)).enumerate() {
            row[targets[i]] -= 1.0;
            row *= weights[i];
        }
        Ok(grad)
    }

    fn name(&self) -> &'static str {
        "CrossEntropy"
    }
}

//! Loss function trait

use crate::Result;
use ndarray::{Array1, Array2};

/// Trait for classification losses
pub trait LossFn {
    /// Loss of each sample
    fn per_sample(&self, logits: &Array2<f32>, targets: &Array1<usize>) -> Result<Array1<f32>>;

    /// Gradient of `sum_i weights[i] * loss_i` w.r.t. the logits
    fn backward(
        &self,
        logits: &Array2<f32>,
        targets: &Array1<usize>,
        weights: &Array1<f32>,
    ) -> Result<Array2<f32>>;

    /// Mean loss over the batch, 0.0 for an empty batch
    fn mean(&self, logits: &Array2<f32>, targets: &Array1<usize>) -> Result<f32> {
        Ok(self.per_sample(logits, targets)?.mean().unwrap_or(0.0))
    }

    /// Name of the loss function
    fn name(&self) -> &str;
}

//! Classifier trait

use super::ParamInventory;
use crate::precision::Precision;
use crate::Result;
use ndarray::{Array2, Array4};
use std::collections::BTreeMap;

/// Output of a forward pass
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Raw class scores, one row per image
    pub logits: Array2<f32>,
    /// Auxiliary head output, ignored by the driver
    pub aux: Option<Array2<f32>>,
}

impl ModelOutput {
    pub fn new(logits: Array2<f32>) -> Self {
        Self { logits, aux: None }
    }
}

/// An image classifier the epoch driver can train
///
/// Gradients flow through `backward`: the driver hands over the gradient of the
/// (scaled) batch loss w.r.t. the logits of the most recent `forward`, and the
/// model accumulates parameter gradients into its inventory. Parameters with
/// gradients disabled must be left untouched.
pub trait ImageClassifier {
    /// Place the model for data-parallel execution on `devices` computing in `precision`
    fn prepare(&mut self, _devices: &[usize], _precision: Precision) -> Result<()> {
        Ok(())
    }

    /// Forward pass over an `(N, C, H, W)` batch
    ///
    /// `train_state` overrides the model mode for this call: `Some(false)` forces
    /// inference behaviour even when the model is in training mode.
    fn forward(&mut self, images: &Array4<f32>, train_state: Option<bool>) -> Result<ModelOutput>;

    /// Backpropagate `grad_logits` from the last forward pass
    fn backward(&mut self, grad_logits: &Array2<f32>) -> Result<()>;

    fn inventory(&self) -> &ParamInventory;

    fn inventory_mut(&mut self) -> &mut ParamInventory;

    /// Switch between training and inference mode
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    fn num_classes(&self) -> usize;

    /// Non-tensor attributes mirrored onto the EMA shadow
    fn attributes(&self) -> &BTreeMap<String, String>;

    fn attributes_mut(&mut self) -> &mut BTreeMap<String, String>;
}

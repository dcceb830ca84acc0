//! Parameter inventory
//!
//! A model exposes its trainable tensors as an ordered list. The order is the
//! model's own parameter enumeration order and is what the warm-up freeze
//! counts against. Normalization layers are registered once, when the model
//! builds its inventory, so freezing never needs to inspect layer types.

use crate::{Error, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named tensors keyed by parameter or buffer name
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// A trainable tensor with an optional accumulated gradient
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    data: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
    requires_grad: bool,
}

impl Parameter {
    /// Create a trainable parameter
    pub fn new(name: impl Into<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            grad: None,
            requires_grad: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    pub fn grad_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        self.grad.as_mut()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Toggle gradient tracking. Disabling also drops any pending gradient.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
        if !requires_grad {
            self.grad = None;
        }
    }

    /// Add `grad` into the accumulated gradient; a no-op for frozen parameters
    pub fn accumulate_grad(&mut self, grad: &ArrayD<f32>) -> Result<()> {
        if !self.requires_grad {
            return Ok(());
        }
        if grad.shape() != self.data.shape() {
            return Err(Error::ShapeMismatch(format!(
                "gradient for '{}' has shape {:?}, parameter has {:?}",
                self.name,
                grad.shape(),
                self.data.shape()
            )));
        }
        match self.grad.as_mut() {
            Some(existing) => *existing += grad,
            None => self.grad = Some(grad.clone()),
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

/// Non-trainable state such as normalization running statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buffer {
    pub name: String,
    pub data: ArrayD<f32>,
}

/// A normalization layer with affine parameters
///
/// `weight` and `bias` index into the owning inventory's parameter list.
/// A frozen layer reports inference mode regardless of the model mode.
#[derive(Debug, Clone)]
pub struct NormLayer {
    name: String,
    weight: Option<usize>,
    bias: Option<usize>,
    mode_training: bool,
    frozen: bool,
}

impl NormLayer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> Option<usize> {
        self.weight
    }

    pub fn bias(&self) -> Option<usize> {
        self.bias
    }

    /// Whether the layer updates running statistics on the next forward pass
    pub fn training(&self) -> bool {
        self.mode_training && !self.frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn affine(&self) -> impl Iterator<Item = usize> {
        self.weight.into_iter().chain(self.bias)
    }
}

/// Ordered parameters, buffers and normalization layers of a model
#[derive(Debug, Clone, Default)]
pub struct ParamInventory {
    params: Vec<Parameter>,
    buffers: Vec<Buffer>,
    norm_layers: Vec<NormLayer>,
}

impl ParamInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its position
    pub fn push(&mut self, param: Parameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    /// Append a buffer and return its position
    pub fn push_buffer(&mut self, name: impl Into<String>, data: ArrayD<f32>) -> usize {
        self.buffers.push(Buffer {
            name: name.into(),
            data,
        });
        self.buffers.len() - 1
    }

    /// Register a normalization layer over already-pushed affine parameters
    pub fn register_norm_layer(
        &mut self,
        name: impl Into<String>,
        weight: Option<usize>,
        bias: Option<usize>,
    ) -> Result<()> {
        let name = name.into();
        for idx in weight.into_iter().chain(bias) {
            if idx >= self.params.len() {
                return Err(Error::Model(format!(
                    "norm layer '{name}' references parameter {idx}, inventory has {}",
                    self.params.len()
                )));
            }
        }
        self.norm_layers.push(NormLayer {
            name,
            weight,
            bias,
            mode_training: true,
            frozen: false,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [Buffer] {
        &mut self.buffers
    }

    pub fn norm_layers(&self) -> &[NormLayer] {
        &self.norm_layers
    }

    /// Model-level train/eval switch as seen by the normalization layers
    pub fn set_norm_mode(&mut self, training: bool) {
        for layer in &mut self.norm_layers {
            layer.mode_training = training;
        }
    }

    /// Disable gradients for the first `count` parameters in inventory order
    pub fn freeze_leading(&mut self, count: usize) {
        for param in self.params.iter_mut().take(count) {
            param.set_requires_grad(false);
        }
    }

    pub fn set_requires_grad_all(&mut self, requires_grad: bool) {
        for param in &mut self.params {
            param.set_requires_grad(requires_grad);
        }
    }

    /// Freeze or release every normalization layer together with its affine parameters
    pub fn set_norm_frozen(&mut self, frozen: bool) {
        for layer in &mut self.norm_layers {
            layer.frozen = frozen;
            if !frozen {
                layer.mode_training = true;
            }
            for idx in layer.affine() {
                self.params[idx].set_requires_grad(!frozen);
            }
        }
    }

    pub fn zero_grad(&mut self) {
        for param in &mut self.params {
            param.zero_grad();
        }
    }

    /// Indices of parameters that currently track gradients
    pub fn trainable_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.requires_grad())
            .map(|(i, _)| i)
            .collect()
    }

    /// Snapshot parameters and buffers by name
    pub fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for param in &self.params {
            state.insert(param.name.clone(), param.data.clone());
        }
        for buffer in &self.buffers {
            state.insert(buffer.name.clone(), buffer.data.clone());
        }
        state
    }

    /// Restore parameters and buffers; every entry must be present with a matching shape
    ///
    /// All entries are checked before any is written, so on error the inventory
    /// is left as it was.
    pub fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let names = self
            .params
            .iter()
            .map(|p| (p.name.as_str(), p.data.shape()))
            .chain(self.buffers.iter().map(|b| (b.name.as_str(), b.data.shape())));
        for (name, shape) in names {
            let saved = state
                .get(name)
                .ok_or_else(|| Error::Checkpoint(format!("missing tensor '{name}'")))?;
            if saved.shape() != shape {
                return Err(Error::ShapeMismatch(format!(
                    "tensor '{name}' saved as {:?}, model expects {:?}",
                    saved.shape(),
                    shape
                )));
            }
        }

        let slots = self
            .params
            .iter_mut()
            .map(|p| (p.name.as_str(), &mut p.data))
            .chain(self.buffers.iter_mut().map(|b| (b.name.as_str(), &mut b.data)));
        for (name, data) in slots {
            if let Some(saved) = state.get(name) {
                data.assign(saved);
            }
        }
        Ok(())
    }
}

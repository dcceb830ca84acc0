//! Normalization + linear head classifier
//!
//! Flattens each image, normalizes features with a batch-norm layer and maps
//! them to class scores with a fully connected layer. Parameter order is
//! `norm.weight, norm.bias, fc.weight, fc.bias`, so freezing all but the last
//! two parameters leaves exactly the head trainable.

use super::{ImageClassifier, ModelOutput, ParamInventory, Parameter};
use crate::precision::{round_array, Precision};
use crate::{Error, Result};
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const NORM_WEIGHT: usize = 0;
const NORM_BIAS: usize = 1;
const FC_WEIGHT: usize = 2;
const FC_BIAS: usize = 3;

const RUNNING_MEAN: usize = 0;
const RUNNING_VAR: usize = 1;

const NORM_EPS: f32 = 1e-5;
const NORM_MOMENTUM: f32 = 0.1;

#[derive(Debug, Clone)]
struct ForwardCache {
    normalized: Array2<f32>,
    hidden: Array2<f32>,
}

/// Reference classifier: batch norm over flattened pixels, then a linear head
#[derive(Debug, Clone)]
pub struct NormLinearClassifier {
    inventory: ParamInventory,
    attributes: BTreeMap<String, String>,
    in_features: usize,
    num_classes: usize,
    training: bool,
    precision: Precision,
    cache: Option<ForwardCache>,
}

impl NormLinearClassifier {
    /// Build a classifier for `in_features = C * H * W` inputs
    ///
    /// Head weights are drawn from `U(-1/sqrt(in), 1/sqrt(in))` with `seed`.
    pub fn new(in_features: usize, num_classes: usize, seed: u64) -> Result<Self> {
        if in_features == 0 || num_classes == 0 {
            return Err(Error::Model(format!(
                "in_features ({in_features}) and num_classes ({num_classes}) must be positive"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (in_features as f32).sqrt();
        let fc_weight = ArrayD::from_shape_fn(IxDyn(&[num_classes, in_features]), |_| {
            rng.random_range(-bound..bound)
        });

        let mut inventory = ParamInventory::new();
        let w = inventory.push(Parameter::new("norm.weight", ArrayD::ones(IxDyn(&[in_features]))));
        let b = inventory.push(Parameter::new("norm.bias", ArrayD::zeros(IxDyn(&[in_features]))));
        inventory.push(Parameter::new("fc.weight", fc_weight));
        inventory.push(Parameter::new("fc.bias", ArrayD::zeros(IxDyn(&[num_classes]))));
        inventory.push_buffer("norm.running_mean", ArrayD::zeros(IxDyn(&[in_features])));
        inventory.push_buffer("norm.running_var", ArrayD::ones(IxDyn(&[in_features])));
        inventory.register_norm_layer("norm", Some(w), Some(b))?;

        let mut attributes = BTreeMap::new();
        attributes.insert("arch".to_string(), "norm-linear".to_string());
        attributes.insert("num_classes".to_string(), num_classes.to_string());

        Ok(Self {
            inventory,
            attributes,
            in_features,
            num_classes,
            training: true,
            precision: Precision::Fp32,
            cache: None,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    fn param_1d(&self, idx: usize) -> Result<ArrayView1<'_, f32>> {
        Ok(self.inventory.params()[idx].data().view().into_dimensionality::<Ix1>()?)
    }

    fn param_2d(&self, idx: usize) -> Result<ArrayView2<'_, f32>> {
        Ok(self.inventory.params()[idx].data().view().into_dimensionality::<Ix2>()?)
    }

    fn buffer_1d(&self, idx: usize) -> Result<Array1<f32>> {
        Ok(self.inventory.buffers()[idx].data.clone().into_dimensionality::<Ix1>()?)
    }

    fn flatten(&self, images: &Array4<f32>) -> Result<Array2<f32>> {
        let n = images.len_of(Axis(0));
        let features = images.len_of(Axis(1)) * images.len_of(Axis(2)) * images.len_of(Axis(3));
        if features != self.in_features {
            return Err(Error::ShapeMismatch(format!(
                "images have {features} features per sample, model expects {}",
                self.in_features
            )));
        }
        Ok(images.to_owned().into_shape_with_order((n, features))?)
    }

    /// Batch statistics when the norm layer is training, running statistics otherwise
    fn norm_statistics(&mut self, x: &Array2<f32>, use_batch: bool) -> Result<(Array1<f32>, Array1<f32>)> {
        let n = x.nrows();
        if !use_batch || n < 2 {
            return Ok((self.buffer_1d(RUNNING_MEAN)?, self.buffer_1d(RUNNING_VAR)?));
        }

        let mean = x.mean_axis(Axis(0)).ok_or_else(|| Error::Model("empty batch".into()))?;
        let var = x.var_axis(Axis(0), 0.0);
        let unbiased = x.var_axis(Axis(0), 1.0);

        let buffers = self.inventory.buffers_mut();
        let running_mean = &mut buffers[RUNNING_MEAN].data;
        *running_mean = &*running_mean * (1.0 - NORM_MOMENTUM) + &(mean.clone().into_dyn() * NORM_MOMENTUM);
        let running_var = &mut buffers[RUNNING_VAR].data;
        *running_var = &*running_var * (1.0 - NORM_MOMENTUM) + &(unbiased.into_dyn() * NORM_MOMENTUM);

        Ok((mean, var))
    }
}

impl ImageClassifier for NormLinearClassifier {
    fn prepare(&mut self, devices: &[usize], precision: Precision) -> Result<()> {
        self.precision = precision;
        let devices = devices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.attributes.insert("devices".to_string(), devices);
        Ok(())
    }

    fn forward(&mut self, images: &Array4<f32>, train_state: Option<bool>) -> Result<ModelOutput> {
        let x = self.flatten(images)?;
        let norm_training = self.inventory.norm_layers()[0].training();
        let use_batch = train_state.unwrap_or(true) && norm_training;

        let (mean, var) = self.norm_statistics(&x, use_batch)?;
        let std = var.mapv(|v| (v + NORM_EPS).sqrt());
        let normalized = (&x - &mean) / &std;

        let gamma = self.param_1d(NORM_WEIGHT)?;
        let beta = self.param_1d(NORM_BIAS)?;
        let mut hidden = &normalized * &gamma + &beta;
        round_array(&mut hidden, self.precision);

        let weight = self.param_2d(FC_WEIGHT)?;
        let bias = self.param_1d(FC_BIAS)?;
        let mut logits = hidden.dot(&weight.t()) + &bias;
        round_array(&mut logits, self.precision);

        self.cache = Some(ForwardCache { normalized, hidden });
        Ok(ModelOutput::new(logits))
    }

    fn backward(&mut self, grad_logits: &Array2<f32>) -> Result<()> {
        let cache = self
            .cache
            .take()
            .ok_or_else(|| Error::Model("backward called without a preceding forward".into()))?;
        if grad_logits.dim() != (cache.hidden.nrows(), self.num_classes) {
            return Err(Error::ShapeMismatch(format!(
                "grad_logits {:?} does not match logits ({}, {})",
                grad_logits.dim(),
                cache.hidden.nrows(),
                self.num_classes
            )));
        }

        let weight = self.param_2d(FC_WEIGHT)?.to_owned();
        let d_weight = grad_logits.t().dot(&cache.hidden);
        let d_bias = grad_logits.sum_axis(Axis(0));
        let d_hidden = grad_logits.dot(&weight);
        let d_gamma = (&d_hidden * &cache.normalized).sum_axis(Axis(0));
        let d_beta = d_hidden.sum_axis(Axis(0));

        let params = self.inventory.params_mut();
        params[NORM_WEIGHT].accumulate_grad(&d_gamma.into_dyn())?;
        params[NORM_BIAS].accumulate_grad(&d_beta.into_dyn())?;
        params[FC_WEIGHT].accumulate_grad(&d_weight.into_dyn())?;
        params[FC_BIAS].accumulate_grad(&d_bias.into_dyn())?;
        Ok(())
    }

    fn inventory(&self) -> &ParamInventory {
        &self.inventory
    }

    fn inventory_mut(&mut self) -> &mut ParamInventory {
        &mut self.inventory
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.inventory.set_norm_mode(training);
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array4;

    fn images(n: usize) -> Array4<f32> {
        Array4::from_shape_fn((n, 1, 2, 2), |(i, _, h, w)| (i * 4 + h * 2 + w) as f32 * 0.1)
    }

    #[test]
    fn test_parameter_order() {
        let model = NormLinearClassifier::new(4, 3, 0).unwrap();
        let names: Vec<&str> = model.inventory().params().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["norm.weight", "norm.bias", "fc.weight", "fc.bias"]);
        assert_eq!(model.inventory().norm_layers().len(), 1);
    }

    #[test]
    fn test_forward_shape() {
        let mut model = NormLinearClassifier::new(4, 3, 0).unwrap();
        let out = model.forward(&images(5), None).unwrap();
        assert_eq!(out.logits.dim(), (5, 3));
        assert!(out.aux.is_none());
    }

    #[test]
    fn test_forward_rejects_wrong_feature_count() {
        let mut model = NormLinearClassifier::new(5, 3, 0).unwrap();
        let err = model.forward(&images(2), None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_running_stats_only_update_in_training() {
        let mut model = NormLinearClassifier::new(4, 2, 0).unwrap();
        let before = model.inventory().buffers()[RUNNING_MEAN].data.clone();

        model.forward(&images(4), Some(false)).unwrap();
        assert_eq!(model.inventory().buffers()[RUNNING_MEAN].data, before);

        model.forward(&images(4), None).unwrap();
        assert_ne!(model.inventory().buffers()[RUNNING_MEAN].data, before);
    }

    #[test]
    fn test_frozen_norm_keeps_running_stats() {
        let mut model = NormLinearClassifier::new(4, 2, 0).unwrap();
        model.inventory_mut().set_norm_frozen(true);
        let before = model.inventory().buffers()[RUNNING_VAR].data.clone();
        model.forward(&images(4), None).unwrap();
        assert_eq!(model.inventory().buffers()[RUNNING_VAR].data, before);
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut model = NormLinearClassifier::new(4, 2, 0).unwrap();
        assert!(model.backward(&Array2::zeros((1, 2))).is_err());
    }

    #[test]
    fn test_backward_matches_finite_difference_on_head_bias() {
        let mut model = NormLinearClassifier::new(4, 2, 3).unwrap();
        model.set_training(false);
        let x = images(3);

        // loss = sum(logits[:, 0]); d loss / d fc.bias[0] = N
        let out = model.forward(&x, None).unwrap();
        let mut grad = Array2::zeros(out.logits.dim());
        grad.column_mut(0).fill(1.0);
        model.backward(&grad).unwrap();

        let g = model.inventory().params()[FC_BIAS].grad().unwrap().clone();
        assert_abs_diff_eq!(g[[0]], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g[[1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_backward_respects_frozen_params() {
        let mut model = NormLinearClassifier::new(4, 2, 1).unwrap();
        model.inventory_mut().freeze_leading(2);
        let out = model.forward(&images(2), None).unwrap();
        model.backward(&Array2::ones(out.logits.dim())).unwrap();

        let params = model.inventory().params();
        assert!(params[NORM_WEIGHT].grad().is_none());
        assert!(params[NORM_BIAS].grad().is_none());
        assert!(params[FC_WEIGHT].grad().is_some());
        assert!(params[FC_BIAS].grad().is_some());
    }

    #[test]
    fn test_prepare_sets_precision_and_devices() {
        let mut model = NormLinearClassifier::new(4, 2, 0).unwrap();
        model.prepare(&[0, 1], Precision::Bf16).unwrap();
        assert_eq!(model.precision(), Precision::Bf16);
        assert_eq!(model.attributes()["devices"], "0,1");
    }
}

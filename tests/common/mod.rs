//! Shared fixtures for integration tests
#![allow(dead_code)]

use afinar::augment::{CutMixBatch, MixAugment, SnapMixBatch};
use afinar::model::{ImageClassifier, ModelOutput, NormLinearClassifier, ParamInventory};
use afinar::optim::{OptimizerState, Sam, SharpnessAware, SGD};
use afinar::precision::Precision;
use afinar::train::{Batch, VecLoaders};
use afinar::Result;
use ndarray::{Array1, Array2, Array4};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Classifier wrapper that records training-mode forward and backward calls
#[derive(Debug, Clone)]
pub struct RecordingModel {
    pub inner: NormLinearClassifier,
    pub log: EventLog,
}

impl RecordingModel {
    pub fn new(in_features: usize, num_classes: usize, log: EventLog) -> Self {
        Self {
            inner: NormLinearClassifier::new(in_features, num_classes, 11).unwrap(),
            log,
        }
    }
}

impl ImageClassifier for RecordingModel {
    fn prepare(&mut self, devices: &[usize], precision: Precision) -> Result<()> {
        self.log.lock().unwrap().push("prepare".into());
        self.inner.prepare(devices, precision)
    }

    fn forward(&mut self, images: &Array4<f32>, train_state: Option<bool>) -> Result<ModelOutput> {
        if train_state != Some(false) {
            self.log.lock().unwrap().push("forward".into());
        }
        self.inner.forward(images, train_state)
    }

    fn backward(&mut self, grad_logits: &Array2<f32>) -> Result<()> {
        self.log.lock().unwrap().push("backward".into());
        self.inner.backward(grad_logits)
    }

    fn inventory(&self) -> &ParamInventory {
        self.inner.inventory()
    }

    fn inventory_mut(&mut self) -> &mut ParamInventory {
        self.inner.inventory_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.inner.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.inner.is_training()
    }

    fn num_classes(&self) -> usize {
        self.inner.num_classes()
    }

    fn attributes(&self) -> &BTreeMap<String, String> {
        self.inner.attributes()
    }

    fn attributes_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.inner.attributes_mut()
    }
}

/// SAM over SGD that records both steps
pub struct RecordingSam {
    inner: Sam<SGD>,
    log: EventLog,
}

impl RecordingSam {
    pub fn new(lr: f32, log: EventLog) -> Self {
        Self {
            inner: Sam::new(SGD::new(lr, 0.9), 0.05),
            log,
        }
    }
}

impl SharpnessAware for RecordingSam {
    fn first_step(&mut self, params: &mut [afinar::model::Parameter], zero_grad: bool) {
        self.log.lock().unwrap().push("first_step".into());
        self.inner.first_step(params, zero_grad);
    }

    fn second_step(&mut self, params: &mut [afinar::model::Parameter], zero_grad: bool) {
        self.log.lock().unwrap().push("second_step".into());
        self.inner.second_step(params, zero_grad);
    }

    fn restore(&mut self, params: &mut [afinar::model::Parameter]) {
        self.inner.restore(params);
    }

    fn lr(&self) -> f32 {
        self.inner.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    fn state(&self) -> OptimizerState {
        self.inner.state()
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        self.inner.load_state(state)
    }
}

/// Deterministic mixer: snapmix pairs each image with the next label,
/// cutmix uses a fixed `lam` of 0.5
#[derive(Debug, Clone, Default)]
pub struct FixedMix {
    pub log: EventLog,
}

fn rotated(labels: &Array1<usize>) -> Array1<usize> {
    let n = labels.len();
    (0..n).map(|i| labels[(i + 1) % n]).collect()
}

impl<M: ?Sized> MixAugment<M> for FixedMix {
    fn snapmix(
        &mut self,
        images: &Array4<f32>,
        labels: &Array1<usize>,
        alpha: f32,
        _model: &mut M,
    ) -> Result<SnapMixBatch> {
        self.log.lock().unwrap().push(format!("snapmix {alpha}"));
        let n = labels.len();
        Ok(SnapMixBatch {
            images: images.clone(),
            labels_a: labels.clone(),
            labels_b: rotated(labels),
            lam_a: Array1::from_elem(n, 0.75),
            lam_b: Array1::from_elem(n, 0.25),
        })
    }

    fn cutmix(&mut self, images: &Array4<f32>, labels: &Array1<usize>) -> Result<CutMixBatch> {
        self.log.lock().unwrap().push("cutmix".into());
        Ok(CutMixBatch {
            images: images.clone(),
            labels_a: labels.clone(),
            labels_b: rotated(labels),
            lam: 0.5,
        })
    }
}

/// Two-class data separable by the sign of the pixels, shape `(n, 1, 2, 2)`
pub fn separable_batch(n: usize, offset: usize) -> Batch {
    let labels: Array1<usize> = (0..n).map(|i| (i + offset) % 2).collect();
    let images = Array4::from_shape_fn((n, 1, 2, 2), |(i, _, h, w)| {
        let sign = if labels[i] == 0 { -1.0 } else { 1.0 };
        sign * (1.0 + 0.1 * (h * 2 + w) as f32) + 0.05 * i as f32
    });
    Batch::new(images, labels).unwrap()
}

pub fn separable_loaders() -> VecLoaders {
    VecLoaders::new(
        vec![separable_batch(4, 0), separable_batch(3, 1), separable_batch(2, 0)],
        vec![separable_batch(6, 1)],
    )
}

//! Model exponential moving average
//!
//! Keeps a shadow copy of the model whose parameters and buffers trail the
//! live model. Early updates use a smaller decay so the shadow is not pinned
//! to the random initialization:
//!
//! `d = decay * (1 - exp(-updates / 2000))`
//! `ema = d * ema + (1 - d) * model`

use crate::model::ImageClassifier;
use crate::{Error, Result};
use tracing::debug;

/// Default EMA decay
pub const DEFAULT_EMA_DECAY: f32 = 0.9999;

/// Number of updates over which the effective decay ramps up
const DECAY_RAMP: f64 = 2000.0;

/// Shadow model updated after every optimizer step
#[derive(Debug, Clone)]
pub struct ModelEma<M> {
    ema: M,
    decay: f32,
    updates: u64,
}

impl<M: ImageClassifier + Clone> ModelEma<M> {
    /// Build the shadow from the current weights of `model`
    ///
    /// The shadow is in inference mode and none of its parameters track gradients.
    pub fn new(model: &M, decay: f32) -> Self {
        let mut ema = model.clone();
        ema.set_training(false);
        ema.inventory_mut().set_requires_grad_all(false);
        Self {
            ema,
            decay,
            updates: 0,
        }
    }

    /// Resume the ramp from a known update count
    pub fn with_updates(mut self, updates: u64) -> Self {
        self.updates = updates;
        self
    }

    /// Effective decay after `updates` updates
    pub fn decay_at(&self, updates: u64) -> f32 {
        let ramp = 1.0 - (-(updates as f64) / DECAY_RAMP).exp();
        (f64::from(self.decay) * ramp) as f32
    }

    /// Blend the model's parameters and buffers into the shadow
    pub fn update(&mut self, model: &M) -> Result<()> {
        self.updates += 1;
        let d = self.decay_at(self.updates);

        let source = model.inventory();
        let target = self.ema.inventory_mut();
        if source.len() != target.len() || source.buffers().len() != target.buffers().len() {
            return Err(Error::ShapeMismatch(format!(
                "EMA shadow has {} params / {} buffers, model has {} / {}",
                target.len(),
                target.buffers().len(),
                source.len(),
                source.buffers().len()
            )));
        }

        for (shadow, live) in target.params_mut().iter_mut().zip(source.params()) {
            blend(shadow.data_mut(), live.data(), d, live.name())?;
        }
        for (shadow, live) in target.buffers_mut().iter_mut().zip(source.buffers()) {
            blend(&mut shadow.data, &live.data, d, &live.name)?;
        }

        debug!(updates = self.updates, decay = d, "EMA update");
        Ok(())
    }

    /// Copy non-tensor attributes from `model` onto the shadow
    ///
    /// An empty `include` copies every attribute. Keys starting with `_` are private
    /// and never copied.
    pub fn update_attr(&mut self, model: &M, include: &[&str]) {
        let copied: Vec<(String, String)> = model
            .attributes()
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter(|(key, _)| include.is_empty() || include.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.ema.attributes_mut().extend(copied);
    }

    /// The shadow model
    pub fn ema(&self) -> &M {
        &self.ema
    }

    pub fn ema_mut(&mut self) -> &mut M {
        &mut self.ema
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }
}

fn blend(
    shadow: &mut ndarray::ArrayD<f32>,
    live: &ndarray::ArrayD<f32>,
    d: f32,
    name: &str,
) -> Result<()> {
    if shadow.shape() != live.shape() {
        return Err(Error::ShapeMismatch(format!(
            "EMA tensor '{name}' is {:?}, model tensor is {:?}",
            shadow.shape(),
            live.shape()
        )));
    }
    shadow.zip_mut_with(live, |s, &m| *s = d * *s + (1.0 - d) * m);
    Ok(())
}

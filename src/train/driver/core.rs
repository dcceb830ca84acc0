//! Core EpochDriver struct, construction and resume

use crate::augment::MixAugment;
use crate::config::{validate_config, RunSpec, TrainingParams};
use crate::ema::ModelEma;
use crate::io::{checkpoint_path, Checkpoint};
use crate::model::ImageClassifier;
use crate::optim::{LRScheduler, SharpnessAware};
use crate::precision::{GradScaler, MixedPrecisionConfig};
use crate::train::callback::{CallbackContext, CallbackManager, TrainerCallback};
use crate::train::history::{BestEpoch, History};
use crate::train::loss::{BiTemperedLoss, CrossEntropyLoss, LossFn};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Drives warm-up, dual-step training, EMA, TTA evaluation and checkpointing
pub struct EpochDriver<M: ImageClassifier + Clone> {
    pub(crate) model: M,
    pub(crate) ema: Option<ModelEma<M>>,
    pub(crate) optimizer: Box<dyn SharpnessAware>,
    pub(crate) scheduler: Box<dyn LRScheduler>,
    pub(crate) augment: Box<dyn MixAugment<M>>,
    /// Loss for cutmix batches
    pub(crate) criterion: Box<dyn LossFn>,
    /// Loss for snapmix batches and evaluation
    pub(crate) tempered: Box<dyn LossFn>,
    pub(crate) scaler: GradScaler,
    pub(crate) config: TrainingParams,
    pub(crate) callbacks: CallbackManager,
    pub(crate) history: History,
    pub(crate) best: BestEpoch,
    /// Source of the per-batch augmentation draw
    pub(crate) rng: StdRng,
    pub(crate) global_step: usize,
    /// Set by a step callback; honoured once the epoch checkpoint is written
    pub(crate) stop_requested: bool,
    pub(crate) start_time: Option<Instant>,
}

impl<M: ImageClassifier + Clone> EpochDriver<M> {
    /// Create a driver without EMA, using cross-entropy for cutmix and the
    /// default bi-tempered loss for snapmix and evaluation
    pub fn new(
        model: M,
        optimizer: Box<dyn SharpnessAware>,
        scheduler: Box<dyn LRScheduler>,
        augment: Box<dyn MixAugment<M>>,
        config: TrainingParams,
    ) -> Self {
        let scaler =
            GradScaler::from_config(&MixedPrecisionConfig::for_precision(config.precision));
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            model,
            ema: None,
            optimizer,
            scheduler,
            augment,
            criterion: Box::new(CrossEntropyLoss),
            tempered: Box::new(BiTemperedLoss::default()),
            scaler,
            config,
            callbacks: CallbackManager::new(),
            history: History::new(),
            best: BestEpoch::default(),
            rng,
            global_step: 0,
            stop_requested: false,
            start_time: None,
        }
    }

    /// Validate `spec` and build every component it describes
    pub fn from_spec(spec: &RunSpec, model: M, augment: Box<dyn MixAugment<M>>) -> Result<Self> {
        validate_config(spec)?;
        if model.num_classes() != spec.model.num_classes {
            return Err(Error::ConfigError(format!(
                "model has {} outputs, configuration expects {} classes",
                model.num_classes(),
                spec.model.num_classes
            )));
        }

        let optimizer = spec.optimizer.build();
        let scheduler = spec
            .scheduler
            .build(spec.optimizer.lr, spec.training.num_epoch);
        let tempered = spec.loss.build()?;

        let mut driver = Self::new(model, optimizer, scheduler, augment, spec.training.clone())
            .with_tempered(Box::new(tempered));
        if let Some(decay) = spec.model.ema_decay {
            driver = driver.with_ema(decay);
        }
        Ok(driver)
    }

    /// Track an EMA shadow of the model, built from its current weights
    pub fn with_ema(mut self, decay: f32) -> Self {
        self.ema = Some(ModelEma::new(&self.model, decay));
        self
    }

    /// Replace the cutmix criterion
    pub fn with_criterion(mut self, criterion: Box<dyn LossFn>) -> Self {
        self.criterion = criterion;
        self
    }

    /// Replace the snapmix/evaluation loss
    pub fn with_tempered(mut self, tempered: Box<dyn LossFn>) -> Self {
        self.tempered = tempered;
        self
    }

    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn ema(&self) -> Option<&ModelEma<M>> {
        self.ema.as_ref()
    }

    pub fn config(&self) -> &TrainingParams {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn best(&self) -> BestEpoch {
        self.best
    }

    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    pub fn scaler(&self) -> &GradScaler {
        &self.scaler
    }

    /// Restore model, EMA, optimizer and schedule from a checkpoint
    ///
    /// The next [`run`](Self::run) starts at the checkpoint's `start_epoch`.
    pub fn resume_from(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.model
            .inventory_mut()
            .load_state_dict(&checkpoint.model_state_dict)?;
        if let Some(ema) = self.ema.take() {
            let updates = checkpoint.ema_updates.unwrap_or(ema.updates());
            self.ema = Some(ModelEma::new(&self.model, ema.decay()).with_updates(updates));
        }
        self.optimizer.load_state(&checkpoint.optimizer_state_dict)?;
        self.scheduler.load_state(&checkpoint.lr_scheduler_state_dict)?;
        self.optimizer.set_lr(self.scheduler.get_lr());
        self.config.start_epoch = checkpoint.start_epoch;

        info!(
            start_epoch = checkpoint.start_epoch,
            lr = self.optimizer.lr(),
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Write the checkpoint for a finished `epoch`
    ///
    /// Stores the EMA shadow when one is tracked, otherwise the live model.
    pub(crate) fn save_checkpoint(&self, epoch: usize, save_path: &Path) -> Result<PathBuf> {
        let state = match &self.ema {
            Some(ema) => ema.ema().inventory().state_dict(),
            None => self.model.inventory().state_dict(),
        };
        let mut checkpoint = Checkpoint::new(
            state,
            self.optimizer.state(),
            self.scheduler.state(),
            epoch + 1,
        );
        if let Some(ema) = &self.ema {
            checkpoint = checkpoint.with_ema_updates(ema.updates());
        }

        let path = checkpoint_path(save_path, epoch);
        checkpoint.save(&path)?;
        info!(epoch, path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Callback context for `epoch` from the current driver state
    pub(crate) fn context(&self, epoch: usize) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs: self.config.num_epoch,
            global_step: self.global_step,
            lr: self.optimizer.lr(),
            tta_time: self.config.tta_time,
            best_epoch: self.best.epoch,
            best_accuracy: self.best.accuracy,
            elapsed_secs: self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64()),
            ..CallbackContext::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::PassThroughMix;
    use crate::model::NormLinearClassifier;
    use crate::optim::{Sam, StepDecayLR, SGD};

    fn driver() -> EpochDriver<NormLinearClassifier> {
        let model = NormLinearClassifier::new(4, 3, 0).unwrap();
        EpochDriver::new(
            model,
            Box::new(Sam::new(SGD::new(0.1, 0.9), 0.05)),
            Box::new(StepDecayLR::new(0.1, 2, 0.5)),
            Box::new(PassThroughMix),
            TrainingParams::new(3),
        )
    }

    #[test]
    fn test_driver_creation() {
        let d = driver();
        assert!(d.ema().is_none());
        assert_eq!(d.lr(), 0.1);
        assert!(d.history().is_empty());
        assert_eq!(d.best(), BestEpoch::default());
    }

    #[test]
    fn test_with_ema_builds_inference_shadow() {
        let d = driver().with_ema(0.99);
        let ema = d.ema().unwrap();
        assert!(!ema.ema().is_training());
        assert!(ema.ema().inventory().trainable_indices().is_empty());
    }

    #[test]
    fn test_from_spec_rejects_class_mismatch() {
        let spec: RunSpec = serde_yaml::from_str("training:\n  num_epoch: 2\n").unwrap();
        let model = NormLinearClassifier::new(4, 3, 0).unwrap();
        let err = EpochDriver::from_spec(&spec, model, Box::new(PassThroughMix))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_spec_rejects_invalid_config() {
        let spec: RunSpec = serde_yaml::from_str("training:\n  num_epoch: 0\n").unwrap();
        let model = NormLinearClassifier::new(4, 5, 0).unwrap();
        let err = EpochDriver::from_spec(&spec, model, Box::new(PassThroughMix))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_from_spec_tracks_ema_by_default() {
        let spec: RunSpec = serde_yaml::from_str("training:\n  num_epoch: 2\n").unwrap();
        let model = NormLinearClassifier::new(4, 5, 0).unwrap();
        let d = EpochDriver::from_spec(&spec, model, Box::new(PassThroughMix)).unwrap();
        assert!(d.ema().is_some());
        assert_eq!(d.lr(), 0.01);
    }

    #[test]
    fn test_context_carries_best_and_lr() {
        let mut d = driver();
        d.best.observe(2, 0.5);
        let ctx = d.context(3);
        assert_eq!(ctx.epoch, 3);
        assert_eq!(ctx.max_epochs, 3);
        assert_eq!(ctx.best_epoch, 2);
        assert_eq!(ctx.lr, 0.1);
    }
}

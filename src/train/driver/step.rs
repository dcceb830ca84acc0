//! Single training batch: augmentation choice and the two-pass update

use super::core::EpochDriver;
use super::result::StepOutcome;
use crate::augment::{AugmentPath, MixedBatch};
use crate::config::AugmentSelection;
use crate::model::ImageClassifier;
use crate::train::batch::Batch;
use crate::Result;
use rand::Rng;
use tracing::{debug, warn};

/// Augmentation for a batch given the uniform draw `draw` in `[0, 1)`
pub fn select_path(selection: AugmentSelection, draw: f32, special_augment_prob: f32) -> AugmentPath {
    match selection {
        AugmentSelection::AlwaysSnapmix => AugmentPath::Snapmix,
        AugmentSelection::SpecialAugmentProb if draw < special_augment_prob => AugmentPath::Snapmix,
        AugmentSelection::SpecialAugmentProb => AugmentPath::Cutmix,
    }
}

impl<M: ImageClassifier + Clone> EpochDriver<M> {
    /// Train on one batch
    ///
    /// Call order: augment, forward, backward, first step, forward, backward,
    /// second step, EMA update. Both passes see the same mixed batch.
    pub fn train_step(&mut self, batch: &Batch) -> Result<StepOutcome> {
        let draw: f32 = self.rng.random();
        let path = select_path(
            self.config.augment_selection,
            draw,
            self.config.special_augment_prob,
        );

        let mixed = match path {
            AugmentPath::Snapmix => MixedBatch::Snapmix(self.augment.snapmix(
                &batch.images,
                &batch.labels,
                self.config.snapmix_alpha,
                &mut self.model,
            )?),
            AugmentPath::Cutmix => {
                MixedBatch::Cutmix(self.augment.cutmix(&batch.images, &batch.labels)?)
            }
        };
        mixed.validate()?;

        let first_loss = self.forward_backward(&mixed)?;
        let first_ok = self
            .scaler
            .unscale_params(self.model.inventory_mut().params_mut());
        if first_ok {
            self.optimizer
                .first_step(self.model.inventory_mut().params_mut(), true);
        } else {
            warn!(step = self.global_step, scale = self.scaler.scale(), "overflow in first pass, skipping perturbation");
            self.model.inventory_mut().zero_grad();
        }
        self.scaler.update(first_ok);

        let loss = self.forward_backward(&mixed)?;
        let second_ok = self
            .scaler
            .unscale_params(self.model.inventory_mut().params_mut());
        if second_ok {
            self.optimizer
                .second_step(self.model.inventory_mut().params_mut(), true);
        } else {
            warn!(step = self.global_step, scale = self.scaler.scale(), "overflow in second pass, skipping update");
            let params = self.model.inventory_mut().params_mut();
            self.optimizer.restore(params);
            self.optimizer.zero_grad(params);
        }
        self.scaler.update(second_ok);

        if let Some(ema) = self.ema.as_mut() {
            ema.update(&self.model)?;
        }

        debug!(
            step = self.global_step,
            ?path,
            first_loss,
            loss,
            "train step"
        );
        Ok(StepOutcome {
            loss,
            first_loss,
            path,
            label_count: mixed.label_count(),
            skipped: !(first_ok && second_ok),
        })
    }

    /// Forward the mixed images and backpropagate the scaled loss gradient
    fn forward_backward(&mut self, mixed: &MixedBatch) -> Result<f32> {
        let output = self.model.forward(mixed.images(), None)?;
        let (loss, grad) =
            mixed.loss_and_grad(&output.logits, self.tempered.as_ref(), self.criterion.as_ref())?;
        self.model.backward(&self.scaler.scale_grad(&grad))?;
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::PassThroughMix;
    use crate::config::TrainingParams;
    use crate::model::{ModelOutput, NormLinearClassifier, ParamInventory};
    use crate::optim::{Sam, SharpnessAware, StepDecayLR, SGD};
    use crate::precision::Precision;
    use ndarray::{arr1, Array2, Array4};
    use std::collections::BTreeMap;

    /// Classifier whose `nth` backward call receives infinite gradients
    #[derive(Debug, Clone)]
    struct OverflowOn {
        inner: NormLinearClassifier,
        nth: usize,
        calls: usize,
    }

    impl ImageClassifier for OverflowOn {
        fn forward(&mut self, images: &Array4<f32>, train_state: Option<bool>) -> Result<ModelOutput> {
            self.inner.forward(images, train_state)
        }

        fn backward(&mut self, grad_logits: &Array2<f32>) -> Result<()> {
            self.calls += 1;
            if self.calls == self.nth {
                self.inner.backward(&grad_logits.mapv(|_| f32::INFINITY))
            } else {
                self.inner.backward(grad_logits)
            }
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

    fn fp16_driver(nth: usize) -> EpochDriver<OverflowOn> {
        let model = OverflowOn {
            inner: NormLinearClassifier::new(4, 3, 1).unwrap(),
            nth,
            calls: 0,
        };
        EpochDriver::new(
            model,
            Box::new(Sam::new(SGD::new(0.1, 0.0), 0.05)),
            Box::new(StepDecayLR::new(0.1, 10, 0.5)),
            Box::new(PassThroughMix),
            TrainingParams::new(1).with_precision(Precision::Fp16),
        )
    }

    fn driver(config: TrainingParams) -> EpochDriver<NormLinearClassifier> {
        let model = NormLinearClassifier::new(4, 3, 1).unwrap();
        EpochDriver::new(
            model,
            Box::new(Sam::new(SGD::new(0.1, 0.0), 0.05)),
            Box::new(StepDecayLR::new(0.1, 10, 0.5)),
            Box::new(PassThroughMix),
            config,
        )
    }

    fn batch() -> Batch {
        let images = Array4::from_shape_fn((4, 1, 2, 2), |(i, _, h, w)| {
            (i as f32 - 1.5) * 0.5 + (h * 2 + w) as f32 * 0.2
        });
        Batch::new(images, arr1(&[0, 1, 2, 0])).unwrap()
    }

    #[test]
    fn test_always_snapmix_ignores_draw() {
        for draw in [0.0, 0.5, 0.999] {
            assert_eq!(
                select_path(AugmentSelection::AlwaysSnapmix, draw, 0.0),
                AugmentPath::Snapmix
            );
        }
    }

    #[test]
    fn test_special_augment_prob_threshold() {
        let sel = AugmentSelection::SpecialAugmentProb;
        assert_eq!(select_path(sel, 0.29, 0.3), AugmentPath::Snapmix);
        assert_eq!(select_path(sel, 0.3, 0.3), AugmentPath::Cutmix);
        assert_eq!(select_path(sel, 0.0, 0.0), AugmentPath::Cutmix);
        assert_eq!(select_path(sel, 0.999, 1.0), AugmentPath::Snapmix);
    }

    #[test]
    fn test_train_step_updates_trainable_params() {
        let mut d = driver(TrainingParams::new(1).with_precision(Precision::Fp32));
        let before = d.model().inventory().params()[2].data().clone();
        let outcome = d.train_step(&batch()).unwrap();

        assert_eq!(outcome.path, AugmentPath::Snapmix);
        assert_eq!(outcome.label_count, 4);
        assert!(!outcome.skipped);
        assert!(outcome.loss.is_finite());
        assert_ne!(d.model().inventory().params()[2].data(), &before);
    }

    #[test]
    fn test_train_step_leaves_no_perturbation_or_grads() {
        let mut d = driver(TrainingParams::new(1).with_precision(Precision::Fp32));
        d.train_step(&batch()).unwrap();
        for p in d.model().inventory().params() {
            if let Some(g) = p.grad() {
                assert!(g.iter().all(|&v| v == 0.0), "{} grad not cleared", p.name());
            }
        }
        assert!(d.optimizer.state().name == "sam");
    }

    #[test]
    fn test_train_step_cutmix_path() {
        let config = TrainingParams::new(1)
            .with_precision(Precision::Fp32)
            .with_augment_selection(AugmentSelection::SpecialAugmentProb);
        let mut d = driver(TrainingParams {
            special_augment_prob: 0.0,
            ..config
        });
        let outcome = d.train_step(&batch()).unwrap();
        assert_eq!(outcome.path, AugmentPath::Cutmix);
        assert_eq!(outcome.label_count, 4);
    }

    #[test]
    fn test_train_step_updates_ema() {
        let mut d = driver(TrainingParams::new(1).with_precision(Precision::Fp32)).with_ema(0.9);
        d.train_step(&batch()).unwrap();
        d.train_step(&batch()).unwrap();
        assert_eq!(d.ema().unwrap().updates(), 2);
    }

    #[test]
    fn test_frozen_params_unchanged_by_step() {
        let mut d = driver(TrainingParams::new(1).with_precision(Precision::Fp32));
        d.model_mut().inventory_mut().freeze_leading(2);
        let frozen = d.model().inventory().params()[0].data().clone();
        d.train_step(&batch()).unwrap();
        assert_eq!(d.model().inventory().params()[0].data(), &frozen);
    }

    #[test]
    fn test_first_pass_overflow_skips_perturbation_only() {
        let mut d = fp16_driver(1);
        let before = d.model().inventory().state_dict();
        let outcome = d.train_step(&batch()).unwrap();

        assert!(outcome.skipped);
        assert_eq!(d.scaler().scale(), 32768.0);
        assert_eq!(d.scaler().overflow_count(), 1);
        // the second pass still updates the weights
        let after = d.model().inventory().params()[2].data().clone();
        assert_ne!(&after, &before["fc.weight"]);
        assert!(after.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_second_pass_overflow_restores_weights() {
        let mut d = fp16_driver(2);
        let before: Vec<_> = d
            .model()
            .inventory()
            .params()
            .iter()
            .map(|p| p.data().clone())
            .collect();
        let outcome = d.train_step(&batch()).unwrap();

        assert!(outcome.skipped);
        assert_eq!(d.scaler().scale(), 32768.0);
        assert_eq!(d.scaler().overflow_count(), 1);
        for (p, old) in d.model().inventory().params().iter().zip(&before) {
            assert_eq!(p.data(), old, "{} moved on a skipped update", p.name());
            if let Some(g) = p.grad() {
                assert!(g.iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn test_clean_fp16_step_keeps_scale() {
        let mut d = fp16_driver(usize::MAX);
        let outcome = d.train_step(&batch()).unwrap();
        assert!(!outcome.skipped);
        assert_eq!(d.scaler().scale(), 65536.0);
        assert_eq!(d.scaler().overflow_count(), 0);
    }
}

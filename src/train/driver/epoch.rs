//! One epoch: warm-up, training batches, TTA evaluation and bookkeeping

use super::core::EpochDriver;
use super::result::EpochSummary;
use crate::model::ImageClassifier;
use crate::train::batch::DataLoaders;
use crate::train::callback::{CallbackAction, CallbackContext};
use crate::train::eval::evaluate_tta;
use crate::train::history::{EpochRecord, RunningLoss};
use crate::train::warmup::WarmupSchedule;
use crate::Result;
use tracing::info;

impl<M: ImageClassifier + Clone> EpochDriver<M> {
    /// Run epoch `epoch` without writing its checkpoint
    ///
    /// After evaluation the epoch is recorded in the history, the scheduler
    /// steps and the best tracker is updated, in that order.
    pub fn run_epoch(&mut self, epoch: usize, loaders: &mut dyn DataLoaders) -> Result<EpochSummary> {
        let transition = WarmupSchedule::apply(epoch, &self.config, &mut self.model);
        self.config = transition.config;
        self.model.set_training(true);

        let mut running = RunningLoss::new();
        let mut steps = 0;
        for batch in loaders.train_batches(epoch) {
            let batch = batch?;
            let outcome = self.train_step(&batch)?;
            running.add(outcome.loss, batch.size(), outcome.label_count);
            self.global_step += 1;

            let ctx = CallbackContext {
                step: steps,
                loss: outcome.loss,
                ..self.context(epoch)
            };
            if self.callbacks.on_step_end(&ctx) == CallbackAction::Stop {
                self.stop_requested = true;
            }
            steps += 1;
        }

        if let Some(ema) = self.ema.as_mut() {
            ema.update_attr(&self.model, &[]);
        }

        let tta_time = self.config.tta_time;
        let eval = match self.ema.as_mut() {
            Some(ema) => evaluate_tta(ema.ema_mut(), loaders, tta_time, self.tempered.as_ref())?,
            None => evaluate_tta(&mut self.model, loaders, tta_time, self.tempered.as_ref())?,
        };
        for (i, pass) in eval.passes.iter().enumerate() {
            let ctx = CallbackContext {
                tta_pass: i + 1,
                eval_loss: Some(pass.loss),
                eval_accuracy: Some(pass.accuracy),
                ..self.context(epoch)
            };
            self.callbacks.on_tta_pass(&ctx);
        }

        let train_loss = running.value();
        let lr = self.optimizer.lr();
        self.history.record(EpochRecord {
            train_loss,
            eval_loss: f64::from(eval.loss),
            eval_accuracy: eval.accuracy,
            lr,
        });

        self.scheduler.step();
        let next_lr = self.scheduler.get_lr();
        self.optimizer.set_lr(next_lr);

        let improved = self.best.observe(epoch, eval.accuracy);
        info!(
            epoch,
            train_loss,
            eval_loss = eval.loss,
            eval_accuracy = eval.accuracy,
            lr,
            improved,
            "epoch finished"
        );

        Ok(EpochSummary {
            epoch,
            phase: transition.phase,
            train_loss,
            eval,
            lr,
            next_lr,
            improved,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::PassThroughMix;
    use crate::config::TrainingParams;
    use crate::model::NormLinearClassifier;
    use crate::optim::{Sam, StepDecayLR, SGD};
    use crate::precision::Precision;
    use crate::train::batch::{Batch, VecLoaders};
    use crate::train::warmup::{WarmupPhase, STEADY_TTA_TIME, WARMUP_TTA_TIME};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array4};

    fn driver() -> EpochDriver<NormLinearClassifier> {
        let model = NormLinearClassifier::new(4, 3, 3).unwrap();
        let config = TrainingParams::new(4)
            .with_warm_up(1)
            .with_num_layer(4)
            .with_precision(Precision::Fp32);
        EpochDriver::new(
            model,
            Box::new(Sam::new(SGD::new(0.1, 0.9), 0.05)),
            Box::new(StepDecayLR::new(0.1, 1, 0.5)),
            Box::new(PassThroughMix),
            config,
        )
    }

    fn batch(offset: f32, n: usize) -> Batch {
        let images =
            Array4::from_shape_fn((n, 1, 2, 2), |(i, _, h, w)| offset + i as f32 * 0.3 - (h + w) as f32 * 0.2);
        let labels = (0..n).map(|i| i % 3).collect::<Vec<_>>();
        Batch::new(images, arr1(&labels)).unwrap()
    }

    fn loaders() -> VecLoaders {
        VecLoaders::new(vec![batch(0.0, 4), batch(1.0, 2)], vec![batch(0.5, 3)])
    }

    #[test]
    fn test_frozen_then_unfrozen_epochs() {
        let mut d = driver();
        let mut data = loaders();

        let first = d.run_epoch(1, &mut data).unwrap();
        assert_eq!(first.phase, WarmupPhase::Frozen);
        assert_eq!(first.eval.passes.len(), WARMUP_TTA_TIME);
        assert_eq!(d.model().inventory().trainable_indices(), vec![2, 3]);

        let second = d.run_epoch(2, &mut data).unwrap();
        assert_eq!(second.phase, WarmupPhase::Unfrozen);
        assert_eq!(second.eval.passes.len(), STEADY_TTA_TIME);
        assert_eq!(d.model().inventory().trainable_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_history_and_schedule_order() {
        let mut d = driver();
        let mut data = loaders();
        let summary = d.run_epoch(1, &mut data).unwrap();

        assert_eq!(summary.steps, 2);
        assert_eq!(summary.lr, 0.1);
        assert_abs_diff_eq!(summary.next_lr, 0.05, epsilon = 1e-7);
        assert_eq!(d.history().lr(), &[0.1]);
        assert_abs_diff_eq!(d.lr(), 0.05, epsilon = 1e-7);
        assert_eq!(d.history().len(), 1);
        assert_eq!(d.history().train_loss()[0], summary.train_loss);
    }

    #[test]
    fn test_epoch_without_batches_has_zero_loss() {
        let mut d = driver();
        let mut data = VecLoaders::new(Vec::new(), vec![batch(0.5, 3)]);
        let summary = d.run_epoch(1, &mut data).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.train_loss, 0.0);
    }

    #[test]
    fn test_best_tracks_eval_accuracy() {
        let mut d = driver();
        let mut data = loaders();
        let summary = d.run_epoch(1, &mut data).unwrap();
        assert_eq!(summary.improved, summary.eval.accuracy > 0.0);
        if summary.improved {
            assert_eq!(d.best().epoch, 1);
            assert_eq!(d.best().accuracy, summary.eval.accuracy);
        }
    }
}

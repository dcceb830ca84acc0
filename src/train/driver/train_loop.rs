//! Multi-epoch run with checkpointing and callbacks

use super::core::EpochDriver;
use super::result::TrainReport;
use crate::model::ImageClassifier;
use crate::train::batch::DataLoaders;
use crate::train::callback::{CallbackAction, CallbackContext};
use crate::Result;
use std::path::Path;
use std::time::Instant;
use tracing::info;

impl<M: ImageClassifier + Clone> EpochDriver<M> {
    /// Train from `start_epoch` through `num_epoch` inclusive
    ///
    /// Each finished epoch writes `{save_path}_epoch-{N}.pt` before its
    /// `on_epoch_end` callbacks fire, so a stop request never loses the epoch.
    /// Any collaborator error ends the run; checkpoints already written stay.
    pub fn run(&mut self, loaders: &mut dyn DataLoaders, save_path: &Path) -> Result<TrainReport> {
        self.start_time = Some(Instant::now());
        self.stop_requested = false;

        self.model
            .prepare(&self.config.device_ids, self.config.precision)?;
        self.optimizer.set_lr(self.scheduler.get_lr());

        let first = self.config.start_epoch;
        let last = self.config.num_epoch;
        info!(
            start_epoch = first,
            num_epoch = last,
            device = %self.config.device,
            precision = %self.config.precision,
            "training started"
        );

        let ctx = self.context(first);
        let mut stopped_early = self.callbacks.on_train_begin(&ctx) == CallbackAction::Stop;
        let mut last_checkpoint = None;

        if !stopped_early {
            for epoch in first..=last {
                let ctx = self.context(epoch);
                if self.callbacks.on_epoch_begin(&ctx) == CallbackAction::Stop {
                    stopped_early = true;
                    break;
                }

                let summary = self.run_epoch(epoch, loaders)?;
                last_checkpoint = Some(self.save_checkpoint(epoch, save_path)?);

                let ctx = CallbackContext {
                    loss: summary.train_loss as f32,
                    lr: summary.lr,
                    eval_loss: Some(summary.eval.loss),
                    eval_accuracy: Some(summary.eval.accuracy),
                    ..self.context(epoch)
                };
                let action = self.callbacks.on_epoch_end(&ctx);
                if action == CallbackAction::Stop || self.stop_requested {
                    stopped_early = epoch < last;
                    break;
                }
            }
        }

        info!(
            best_epoch = self.best.epoch,
            best_accuracy = self.best.accuracy,
            overflows = self.scaler.overflow_count(),
            "Finish: - Best Epoch: {} - Best accuracy: {}",
            self.best.epoch,
            self.best.accuracy
        );
        let ctx = self.context(last);
        self.callbacks.on_train_end(&ctx);

        Ok(TrainReport {
            best: self.best,
            history: self.history.clone(),
            last_checkpoint,
            stopped_early,
            overflows: self.scaler.overflow_count(),
            elapsed_secs: ctx.elapsed_secs,
        })
    }
}

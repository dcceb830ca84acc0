//! Per-epoch history, best-epoch tracking and loss accumulation

use serde::{Deserialize, Serialize};

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub train_loss: f64,
    pub eval_loss: f64,
    pub eval_accuracy: f64,
    pub lr: f32,
}

/// Append-only per-epoch metric series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    train_loss: Vec<f64>,
    eval_loss: Vec<f64>,
    eval_acc: Vec<f64>,
    lr: Vec<f32>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch to every series
    pub fn record(&mut self, record: EpochRecord) {
        self.train_loss.push(record.train_loss);
        self.eval_loss.push(record.eval_loss);
        self.eval_acc.push(record.eval_accuracy);
        self.lr.push(record.lr);
    }

    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }

    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }

    pub fn eval_loss(&self) -> &[f64] {
        &self.eval_loss
    }

    pub fn eval_acc(&self) -> &[f64] {
        &self.eval_acc
    }

    pub fn lr(&self) -> &[f32] {
        &self.lr
    }

    pub fn last(&self) -> Option<EpochRecord> {
        let i = self.len().checked_sub(1)?;
        Some(EpochRecord {
            train_loss: self.train_loss[i],
            eval_loss: self.eval_loss[i],
            eval_accuracy: self.eval_acc[i],
            lr: self.lr[i],
        })
    }
}

/// Best evaluation accuracy seen so far and the epoch that reached it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestEpoch {
    pub epoch: usize,
    pub accuracy: f64,
}

impl Default for BestEpoch {
    fn default() -> Self {
        Self {
            epoch: 1,
            accuracy: 0.0,
        }
    }
}

impl BestEpoch {
    /// Record `accuracy` for `epoch`; returns true only on a strict improvement
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        if accuracy > self.accuracy {
            self.epoch = epoch;
            self.accuracy = accuracy;
            true
        } else {
            false
        }
    }
}

/// Label-weighted running mean of batch losses
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningLoss {
    mass: f64,
    labels: usize,
}

impl RunningLoss {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch: `loss * batch_size` to the mass, `label_count` to the denominator
    pub fn add(&mut self, loss: f32, batch_size: usize, label_count: usize) {
        self.mass += f64::from(loss) * batch_size as f64;
        self.labels += label_count;
    }

    pub fn labels(&self) -> usize {
        self.labels
    }

    /// Epoch loss, 0.0 when no labels were seen
    pub fn value(&self) -> f64 {
        if self.labels == 0 {
            0.0
        } else {
            self.mass / self.labels as f64
        }
    }
}

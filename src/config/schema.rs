//! YAML schema for a training run
//!
//! Every section except `training.num_epoch` has defaults, so a minimal run
//! file only names the epoch count.

use crate::ema::DEFAULT_EMA_DECAY;
use crate::optim::{CosineAnnealingLR, LRScheduler, Sam, SharpnessAware, StepDecayLR, SGD};
use crate::precision::Precision;
use crate::train::BiTemperedLoss;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameter tensors in the reference backbone; all but the last two are frozen during warm-up
pub const DEFAULT_NUM_LAYER: usize = 213;

/// Complete run specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    /// Training hyperparameters
    pub training: TrainingParams,

    /// Model configuration
    #[serde(default)]
    pub model: ModelParams,

    /// Optimizer configuration
    #[serde(default)]
    pub optimizer: OptimSpec,

    /// Learning rate schedule
    #[serde(default)]
    pub scheduler: SchedulerSpec,

    /// Tempered logistic loss used for snapmix batches and evaluation
    #[serde(default)]
    pub loss: LossSpec,

    /// Checkpoint path prefix; epoch N is written to `{save_path}_epoch-N.pt`
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
}

fn default_save_path() -> PathBuf {
    PathBuf::from("./checkpoints/model")
}

/// How each training batch picks its augmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentSelection {
    /// Always take the snapmix path; a draw is still consumed per batch
    #[default]
    AlwaysSnapmix,
    /// Snapmix when the draw is below `special_augment_prob`, cutmix otherwise
    SpecialAugmentProb,
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// First epoch to run (1-based); checkpoints store the next one
    #[serde(default = "default_start_epoch")]
    pub start_epoch: usize,

    /// Last epoch to run, inclusive
    pub num_epoch: usize,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_device_ids")]
    pub device_ids: Vec<usize>,

    /// Epochs trained with the backbone frozen
    #[serde(default = "default_warm_up")]
    pub warm_up: usize,

    /// Evaluation passes averaged per epoch
    #[serde(default = "default_tta_time", alias = "TTA_time")]
    pub tta_time: usize,

    #[serde(default = "default_special_augment_prob")]
    pub special_augment_prob: f32,

    #[serde(default = "default_snapmix_alpha")]
    pub snapmix_alpha: f32,

    #[serde(default)]
    pub augment_selection: AugmentSelection,

    /// Parameter tensor count the warm-up freeze counts against
    #[serde(default = "default_num_layer")]
    pub num_layer: usize,

    #[serde(default)]
    pub precision: Precision,

    /// Seed for per-batch augmentation draws
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_start_epoch() -> usize {
    1
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_device_ids() -> Vec<usize> {
    vec![0]
}

fn default_warm_up() -> usize {
    1
}

fn default_tta_time() -> usize {
    1
}

fn default_special_augment_prob() -> f32 {
    1.0
}

fn default_snapmix_alpha() -> f32 {
    5.0
}

fn default_num_layer() -> usize {
    DEFAULT_NUM_LAYER
}

fn default_seed() -> u64 {
    42
}

impl TrainingParams {
    /// Defaults for a run of `num_epoch` epochs
    pub fn new(num_epoch: usize) -> Self {
        Self {
            start_epoch: default_start_epoch(),
            num_epoch,
            device: default_device(),
            device_ids: default_device_ids(),
            warm_up: default_warm_up(),
            tta_time: default_tta_time(),
            special_augment_prob: default_special_augment_prob(),
            snapmix_alpha: default_snapmix_alpha(),
            augment_selection: AugmentSelection::default(),
            num_layer: DEFAULT_NUM_LAYER,
            precision: Precision::default(),
            seed: default_seed(),
        }
    }

    /// Copy of this configuration with a different TTA pass count
    pub fn with_tta_time(&self, tta_time: usize) -> Self {
        Self {
            tta_time,
            ..self.clone()
        }
    }

    pub fn with_warm_up(mut self, warm_up: usize) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn with_num_layer(mut self, num_layer: usize) -> Self {
        self.num_layer = num_layer;
        self
    }

    pub fn with_start_epoch(mut self, start_epoch: usize) -> Self {
        self.start_epoch = start_epoch;
        self
    }

    pub fn with_augment_selection(mut self, selection: AugmentSelection) -> Self {
        self.augment_selection = selection;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Output classes
    pub num_classes: usize,

    /// EMA decay; `None` disables the shadow model
    pub ema_decay: Option<f32>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            num_classes: 5,
            ema_decay: Some(DEFAULT_EMA_DECAY),
        }
    }
}

/// SAM over SGD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimSpec {
    /// Base optimizer name; only "sgd" is supported
    pub name: String,
    pub lr: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    /// SAM neighborhood radius
    pub rho: f32,
    /// Scale the SAM perturbation by parameter magnitude
    pub adaptive: bool,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self {
            name: "sgd".to_string(),
            lr: 0.01,
            momentum: 0.9,
            weight_decay: 1e-4,
            rho: 0.05,
            adaptive: false,
        }
    }
}

impl OptimSpec {
    pub fn build(&self) -> Box<dyn SharpnessAware> {
        let base = SGD::new(self.lr, self.momentum).with_weight_decay(self.weight_decay);
        Box::new(Sam::new(base, self.rho).adaptive(self.adaptive))
    }
}

/// Learning rate schedule, stepped once per epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum SchedulerSpec {
    CosineAnnealing {
        /// Epochs to reach `lr_min`; defaults to the run length
        #[serde(default)]
        t_max: Option<usize>,
        #[serde(default)]
        lr_min: f32,
    },
    StepDecay {
        step_size: usize,
        gamma: f32,
    },
}

impl Default for SchedulerSpec {
    fn default() -> Self {
        SchedulerSpec::CosineAnnealing {
            t_max: None,
            lr_min: 1e-6,
        }
    }
}

impl SchedulerSpec {
    pub fn build(&self, lr: f32, num_epoch: usize) -> Box<dyn LRScheduler> {
        match *self {
            SchedulerSpec::CosineAnnealing { t_max, lr_min } => {
                Box::new(CosineAnnealingLR::new(lr, t_max.unwrap_or(num_epoch), lr_min))
            }
            SchedulerSpec::StepDecay { step_size, gamma } => {
                Box::new(StepDecayLR::new(lr, step_size, gamma))
            }
        }
    }
}

/// Bi-tempered logistic loss parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossSpec {
    pub t1: f32,
    pub t2: f32,
    pub label_smoothing: f32,
    pub num_iters: usize,
}

impl Default for LossSpec {
    fn default() -> Self {
        Self {
            t1: 0.8,
            t2: 1.4,
            label_smoothing: 0.0,
            num_iters: 5,
        }
    }
}

impl LossSpec {
    pub fn build(&self) -> Result<BiTemperedLoss> {
        Ok(BiTemperedLoss::new(self.t1, self.t2)?
            .with_label_smoothing(self.label_smoothing)
            .with_num_iters(self.num_iters))
    }
}

//! Afinar: epoch-based training for image classifiers
//!
//! The crate drives a classifier through a fixed schedule:
//! - a freeze/unfreeze warm-up over the first epochs
//! - per batch, one of two mixing augmentations and a two-pass
//!   sharpness-aware (SAM) update under a gradient scaler
//! - an exponential moving average of the weights
//! - test-time augmentation at evaluation, scored on averaged predictions
//! - one checkpoint per epoch and best-accuracy tracking
//!
//! Models, augmentations and data loading are supplied through the
//! [`model::ImageClassifier`], [`augment::MixAugment`] and
//! [`train::DataLoaders`] traits. [`train::EpochDriver`] owns the rest.

pub mod augment;
pub mod cli;
pub mod config;
pub mod ema;
pub mod error;
pub mod io;
pub mod model;
pub mod optim;
pub mod precision;
pub mod train;

pub use error::{Error, Result};
pub use io::{checkpoint_path, Checkpoint};

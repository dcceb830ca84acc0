//! Mixed-precision support for the training driver
//!
//! The driver keeps fp32 master weights on the parameter inventory. A model that
//! computes in reduced precision rounds its activations through [`round_array`], and
//! the [`GradScaler`] scales the loss gradient before the backward pass so small
//! gradients survive fp16. Unscaled gradients containing inf/NaN cause the
//! corresponding optimizer step to be skipped.
//!
//! ```ignore
//! let mut scaler = GradScaler::from_config(&MixedPrecisionConfig::fp16());
//! model.backward(&scaler.scale_grad(&grad_logits))?;
//! let valid = scaler.unscale_params(model.inventory_mut().params_mut());
//! if valid { optimizer.first_step(params, true) }
//! scaler.update(valid);
//! ```

mod config;
mod conversions;
mod precision_types;
mod scaler;


pub use config::MixedPrecisionConfig;
pub use conversions::round_array;
pub use precision_types::Precision;
pub use scaler::GradScaler;

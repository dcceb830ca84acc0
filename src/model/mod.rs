//! Classifier abstraction and the bundled reference model
//!
//! The driver only talks to models through [`ImageClassifier`]. A model owns a
//! [`ParamInventory`] describing its parameters in enumeration order and its
//! normalization layers; everything the warm-up schedule, the optimizer and the
//! EMA need goes through that inventory.

mod classifier;
mod norm_linear;
mod param;

pub use classifier::{ImageClassifier, ModelOutput};
pub use norm_linear::NormLinearClassifier;
pub use param::{Buffer, NormLayer, ParamInventory, Parameter, StateDict};

//! Single-command training from YAML configuration

mod demo;
mod loader;

pub use demo::{create_demo_batches, create_demo_loaders, DEMO_FEATURES, DEMO_IMAGE_SHAPE};
pub use loader::{load_spec, parse_spec, train_from_spec, train_from_yaml};

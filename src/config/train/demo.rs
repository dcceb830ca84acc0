//! Synthetic image batches for runs without a dataset

use crate::train::{Batch, VecLoaders};
use crate::Result;
use ndarray::{Array1, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `(C, H, W)` of demo images
pub const DEMO_IMAGE_SHAPE: (usize, usize, usize) = (3, 4, 4);

/// Flattened feature count of a demo image
pub const DEMO_FEATURES: usize = DEMO_IMAGE_SHAPE.0 * DEMO_IMAGE_SHAPE.1 * DEMO_IMAGE_SHAPE.2;

/// Create `num_batches` noisy, class-separable batches
///
/// Every pixel of a class-`c` image is `c - (num_classes - 1) / 2` plus uniform
/// noise in `[-0.5, 0.5)`, so a linear head can learn the task.
pub fn create_demo_batches(
    num_classes: usize,
    batch_size: usize,
    num_batches: usize,
    rng: &mut StdRng,
) -> Result<Vec<Batch>> {
    let (c, h, w) = DEMO_IMAGE_SHAPE;
    let center = num_classes.saturating_sub(1) as f32 / 2.0;
    (0..num_batches)
        .map(|b| {
            let labels: Array1<usize> =
                (0..batch_size).map(|i| (b * batch_size + i) % num_classes.max(1)).collect();
            let images = Array4::from_shape_fn((batch_size, c, h, w), |(i, _, _, _)| {
                labels[i] as f32 - center + rng.random_range(-0.5..0.5)
            });
            Batch::new(images, labels)
        })
        .collect()
}

/// Train and evaluation loaders over demo batches, reproducible from `seed`
pub fn create_demo_loaders(num_classes: usize, seed: u64) -> Result<VecLoaders> {
    let mut rng = StdRng::seed_from_u64(seed);
    let train = create_demo_batches(num_classes, 8, 4, &mut rng)?;
    let eval = create_demo_batches(num_classes, 8, 2, &mut rng)?;
    Ok(VecLoaders::new(train, eval))
}

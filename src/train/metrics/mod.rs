//! Evaluation metrics
//!
//! Classification metrics over class scores `(N, K)` and hard labels `(N,)`.

mod classification;


pub use classification::{accuracy, argmax_rows};

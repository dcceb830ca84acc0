//! Rounding to reduced precisions.

use super::Precision;
use half::{bf16, f16};
use ndarray::{ArrayBase, DataMut, Dimension};

/// Round a value to what the given precision can represent
fn round_to(value: f32, precision: Precision) -> f32 {
    match precision {
        Precision::Fp32 => value,
        Precision::Fp16 => f16::from_f32(value).to_f32(),
        Precision::Bf16 => bf16::from_f32(value).to_f32(),
    }
}

/// Round every element of an array in place
///
/// Values beyond the fp16 range become infinite, which the grad scaler then
/// reports as an overflow.
pub fn round_array<S, D>(array: &mut ArrayBase<S, D>, precision: Precision)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    if precision.is_reduced() {
        array.mapv_inplace(|v| round_to(v, precision));
    }
}

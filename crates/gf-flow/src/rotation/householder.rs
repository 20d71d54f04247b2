//! Product of elementary Householder reflections.

use super::RotationState;
use nalgebra::{DMatrix, DVector};

/// Build `Q = H_1 H_2 ... H_k` where each `H_i = I - 2 v v^T / |v|^2`
/// comes from one dimension-sized chunk of `params`. A zero reflection
/// vector contributes the identity rather than dividing by zero.
pub(super) fn build(dimension: usize, iterations: usize, params: &[f64]) -> RotationState {
    let mut q = DMatrix::<f64>::identity(dimension, dimension);
    for chunk in params.chunks_exact(dimension).take(iterations) {
        let v = DVector::from_column_slice(chunk);
        let norm_sq = v.norm_squared();
        if norm_sq <= f64::MIN_POSITIVE {
            continue;
        }
        let h = DMatrix::<f64>::identity(dimension, dimension) - (&v * v.transpose()) * (2.0 / norm_sq);
        q *= h;
    }
    RotationState::Matrix(q)
}

//! LDU-style volume-preserving parametrization: unit-lower times a
//! positive trace-free diagonal times unit-upper.

use super::RotationState;
use nalgebra::{DMatrix, DVector};

/// `(d - 1)` free diagonal entries plus `d (d - 1) / 2` strict entries
/// for each triangular factor. Dimension 1 degenerates to the identity.
pub(super) fn param_count(dimension: usize) -> usize {
    if dimension < 2 {
        return 0;
    }
    (dimension - 1) + dimension * (dimension - 1)
}

pub(super) fn build(dimension: usize, params: &[f64]) -> RotationState {
    if dimension < 2 {
        return RotationState::Identity { dimension };
    }
    let strict = dimension * (dimension - 1) / 2;
    let (diag_raw, rest) = params.split_at(dimension - 1);
    let (lower_raw, upper_raw) = rest.split_at(strict);

    // Last diagonal entry closes the trace so det(exp(diag)) == 1.
    let mut log_diag = DVector::<f64>::zeros(dimension);
    let mut sum = 0.0;
    for (slot, &p) in log_diag.iter_mut().zip(diag_raw.iter()) {
        *slot = p;
        sum += p;
    }
    log_diag[dimension - 1] = -sum;

    let left = strict_fill(dimension, lower_raw, true);
    let right = strict_fill(dimension, upper_raw, false);
    RotationState::Factored { left, log_diag, right }
}

fn strict_fill(dimension: usize, values: &[f64], lower: bool) -> DMatrix<f64> {
    let mut m = DMatrix::<f64>::identity(dimension, dimension);
    let mut it = values.iter();
    for row in 1..dimension {
        for col in 0..row {
            let v = *it.next().unwrap_or(&0.0);
            if lower {
                m[(row, col)] = v;
            } else {
                m[(col, row)] = v;
            }
        }
    }
    m
}

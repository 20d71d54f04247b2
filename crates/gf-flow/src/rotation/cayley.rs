//! 2×2 rotation via the Cayley map of a single scalar. Covers all
//! rotations except the half turn, which it approaches as |t| grows.

use super::RotationState;
use nalgebra::DMatrix;

pub(super) fn build(t: f64) -> RotationState {
    let m = 1.0 / (1.0 + t * t);
    let c = (1.0 - t * t) * m;
    let s = 2.0 * t * m;
    RotationState::Matrix(DMatrix::from_row_slice(2, 2, &[c, -s, s, c]))
}

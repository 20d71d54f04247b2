//! Rotation as a product of Givens rotations, one angle per unordered
//! axis pair taken in combination order (0,1), (0,2), ..., (d-2, d-1).

use super::RotationState;
use nalgebra::DMatrix;

pub(super) fn build(dimension: usize, angles: &[f64]) -> RotationState {
    let mut q = DMatrix::<f64>::identity(dimension, dimension);
    let mut it = angles.iter();
    for a in 0..dimension {
        for b in (a + 1)..dimension {
            let theta = match it.next() {
                Some(t) => *t,
                None => break,
            };
            let (sin, cos) = theta.sin_cos();
            let mut g = DMatrix::<f64>::identity(dimension, dimension);
            g[(a, a)] = cos;
            g[(b, b)] = cos;
            g[(a, b)] = sin;
            g[(b, a)] = -sin;
            q = g * q;
        }
    }
    RotationState::Matrix(q)
}

//! Core traits for GaussFlow.
//!
//! The flow-assembly layer that composes a full PDF out of individual
//! bijections depends only on this trait, not on concrete layer types.

use crate::Result;
use nalgebra::{DMatrix, DVector};

/// A parametrized bijection between a target space and a latent space,
/// paired with its log-Jacobian-determinant.
///
/// Both directions thread a `(values, log_det)` pair: `values` is a
/// `batch × dim` matrix, `log_det` a length-`batch` vector that
/// accumulates `log|dy/dx|` additively. For every `x` inside the
/// invertible domain,
/// `log_det_forward(x) + log_det_inverse(forward(x)) == 0`
/// up to floating-point tolerance.
///
/// `extra_params` supplies externally amortized per-sample parameters
/// (one row per batch element, flat concatenation in the layer's fixed
/// order). When `None`, the layer's own persistent parameters are
/// broadcast across the batch.
pub trait FlowTransform: Send + Sync {
    /// Dimension of the target space.
    fn dimension(&self) -> usize;

    /// Total number of parameters the layer consumes, i.e. the required
    /// row length of `extra_params`.
    fn param_count(&self) -> usize;

    /// Map target-space values to latent-space values, accumulating the
    /// log-determinant.
    fn forward(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra_params: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;

    /// Map latent-space values back to target-space values, removing
    /// the matching log-determinant contribution.
    fn inverse(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra_params: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;
}

//! Volume-preserving linear maps applied ahead of the per-dimension
//! nonlinearity. Every parametrization here has zero log-determinant,
//! so the layer's Jacobian comes from the nonlinearity alone.

mod cayley;
mod givens;
mod householder;
mod triangular;

use crate::options::RotationMode;
use gf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// A rotation parametrization bound to a fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Product of `iterations` Householder reflections.
    Householder {
        /// Target dimension.
        dimension: usize,
        /// Number of reflections.
        iterations: usize,
    },
    /// Trace-free LDU factorization.
    Triangular {
        /// Target dimension.
        dimension: usize,
    },
    /// Product of Givens rotations.
    Angles {
        /// Target dimension.
        dimension: usize,
    },
    /// 2×2 Cayley rotation.
    Cayley,
    /// No rotation.
    Identity {
        /// Target dimension.
        dimension: usize,
    },
}

impl Rotation {
    /// Bind a [`RotationMode`] to a dimension, resolving defaults.
    pub fn new(mode: RotationMode, dimension: usize) -> Result<Self> {
        match mode {
            RotationMode::Householder { iterations } => Ok(Self::Householder {
                dimension,
                iterations: iterations.unwrap_or(dimension),
            }),
            RotationMode::Triangular => Ok(Self::Triangular { dimension }),
            RotationMode::Angles => Ok(Self::Angles { dimension }),
            RotationMode::Cayley => {
                if dimension != 2 {
                    return Err(Error::Config(format!(
                        "cayley rotation requires dimension 2, got {dimension}"
                    )));
                }
                Ok(Self::Cayley)
            }
            RotationMode::NoRotation => Ok(Self::Identity { dimension }),
        }
    }

    /// Target dimension this parametrization acts on.
    pub fn dimension(&self) -> usize {
        match *self {
            Self::Householder { dimension, .. }
            | Self::Triangular { dimension }
            | Self::Angles { dimension }
            | Self::Identity { dimension } => dimension,
            Self::Cayley => 2,
        }
    }

    /// Number of flat parameters this parametrization consumes.
    pub fn param_count(&self) -> usize {
        match *self {
            Self::Householder { dimension, iterations } => dimension * iterations,
            Self::Triangular { dimension } => triangular::param_count(dimension),
            Self::Angles { dimension } => dimension * (dimension - 1) / 2,
            Self::Cayley => 1,
            Self::Identity { .. } => 0,
        }
    }

    /// Materialize the rotation from its slice of flat parameters.
    pub fn state(&self, params: &[f64]) -> Result<RotationState> {
        if params.len() != self.param_count() {
            return Err(Error::Shape(format!(
                "rotation expects {} parameters, got {}",
                self.param_count(),
                params.len()
            )));
        }
        match *self {
            Self::Householder { dimension, iterations } => {
                Ok(householder::build(dimension, iterations, params))
            }
            Self::Triangular { dimension } => Ok(triangular::build(dimension, params)),
            Self::Angles { dimension } => Ok(givens::build(dimension, params)),
            Self::Cayley => Ok(cayley::build(params[0])),
            Self::Identity { dimension } => Ok(RotationState::Identity { dimension }),
        }
    }

    /// Zero-initialized parameters leave the map at the identity, so
    /// Householder draws need explicit randomization elsewhere.
    pub fn identity_at_zero(&self) -> bool {
        !matches!(self, Self::Householder { .. })
    }
}

/// A materialized rotation, ready to apply to vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum RotationState {
    /// No-op map.
    Identity {
        /// Target dimension.
        dimension: usize,
    },
    /// An explicit orthogonal matrix.
    Matrix(DMatrix<f64>),
    /// `left * diag(exp(log_diag)) * right` with unit-triangular
    /// factors and a trace-free diagonal.
    Factored {
        /// Unit-lower-triangular factor.
        left: DMatrix<f64>,
        /// Log-space diagonal, summing to zero.
        log_diag: DVector<f64>,
        /// Unit-upper-triangular factor.
        right: DMatrix<f64>,
    },
}

impl RotationState {
    /// `R * x`.
    pub fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Identity { .. } => x.clone(),
            Self::Matrix(m) => m * x,
            Self::Factored { left, log_diag, right } => {
                let mut y = right * x;
                for (yi, d) in y.iter_mut().zip(log_diag.iter()) {
                    *yi *= d.exp();
                }
                left * y
            }
        }
    }

    /// `R^{-1} * x`. For the orthogonal parametrizations this is the
    /// transpose; the triangular factorization uses forward and back
    /// substitution against its unit-diagonal factors.
    pub fn apply_inverse(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Identity { .. } => x.clone(),
            Self::Matrix(m) => m.tr_mul(x),
            Self::Factored { left, log_diag, right } => {
                // Unit diagonals make both solves infallible.
                let mut y = left
                    .solve_lower_triangular(x)
                    .unwrap_or_else(|| DVector::zeros(x.len()));
                for (yi, d) in y.iter_mut().zip(log_diag.iter()) {
                    *yi *= (-d).exp();
                }
                right
                    .solve_upper_triangular(&y)
                    .unwrap_or_else(|| DVector::zeros(x.len()))
            }
        }
    }
}

//! # gf-flow
//!
//! The Gaussianization flow layer: a parametrized bijection between a
//! target space and a standard-normal latent space, built from
//! - a learned volume-preserving rotation ([`rotation`]),
//! - a mixture-of-skew-logistic nonlinearity mapped through a stable
//!   inverse-normal-CDF step (`gf_prob`), inverted numerically by a
//!   bisection/Newton hybrid ([`solver`]), and
//! - an alternative monotonic rational-quadratic spline nonlinearity
//!   with a closed-form inverse ([`spline`]).
//!
//! The layer threads a `(values, log_det)` pair and implements
//! [`gf_core::FlowTransform`]; parameters are either persistent learned
//! state or supplied per batch row by an external amortization network.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod layer;
pub mod options;
pub mod params;
pub mod rotation;
pub mod solver;
pub mod spline;

pub use layer::GaussianizationLayer;
pub use options::{LayerOptions, NonlinearityKind, RotationMode};
pub use solver::SolverOptions;

//! # gf-prob
//!
//! Probability math for GaussFlow:
//! - small numerically-stable scalar primitives ([`math`])
//! - smooth bounded regulators for unconstrained parameters ([`regulator`])
//! - mixture-of-skew-logistic log-CDF/log-SF/log-PDF quantities
//!   ([`skew_logistic`])
//! - the inverse-normal-CDF transform with stable tail approximations
//!   ([`inverse_normal`])
//!
//! Everything here operates scalar-per-element in log space; no code path
//! evaluates `log(0)` or an unguarded `exp` of a large argument.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod inverse_normal;
pub mod math;
pub mod regulator;
pub mod skew_logistic;

pub use inverse_normal::InverseCdfMode;
pub use regulator::Regulator;
pub use skew_logistic::MixtureQuantities;

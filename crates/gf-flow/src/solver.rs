//! Bisection/Newton hybrid inversion of monotone scalar maps.
//!
//! The mixture-CDF → inverse-normal composite has no closed-form
//! inverse; the layer recovers pre-images with a fixed-cost two-phase
//! scheme: bisection to localize the root and establish a valid
//! bracket, then bracket-safeguarded Newton for fast refinement.
//!
//! Iteration counts are deterministic (no convergence-based early
//! exit): a fixed, bounded compute cost per call in exchange for
//! simplicity and reproducibility. Accuracy is a function of the
//! iteration counts, not a tolerance — callers needing tighter
//! precision raise the counts.

use serde::{Deserialize, Serialize};

/// Options for [`invert_monotone`].
///
/// The defaults are empirical constants; they are exposed rather than
/// hard-coded because they are not known to be optimal for every
/// parameter regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Lower end of the initial bracket.
    pub lower: f64,
    /// Upper end of the initial bracket.
    pub upper: f64,
    /// Fixed number of bisection iterations.
    pub bisection_iters: usize,
    /// Fixed number of safeguarded Newton iterations.
    pub newton_iters: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { lower: -1e5, upper: 1e5, bisection_iters: 25, newton_iters: 20 }
    }
}

/// Solve `f(x) = target` for a strictly increasing `f`.
///
/// `value` evaluates `f`; `value_and_derivative` evaluates `(f, f')`
/// (the derivative phase is more expensive, so the bisection phase
/// avoids it).
///
/// Monotonicity of `f` is assumed and required; violating it is
/// undefined behavior, not detected (a per-iteration check would cost a
/// branch in the batched hot loop). If the true root lies outside
/// `[lower, upper]` the result silently saturates toward a bracket
/// endpoint — callers must pick bounds wide enough for their parameter
/// regime.
pub fn invert_monotone(
    value: impl Fn(f64) -> f64,
    value_and_derivative: impl Fn(f64) -> (f64, f64),
    target: f64,
    opts: &SolverOptions,
) -> f64 {
    let mut lo = opts.lower;
    let mut hi = opts.upper;
    let mut x = 0.5 * (lo + hi);

    for _ in 0..opts.bisection_iters {
        if value(x) < target {
            lo = x;
        } else {
            hi = x;
        }
        x = 0.5 * (lo + hi);
    }

    for _ in 0..opts.newton_iters {
        let (v, d) = value_and_derivative(x);
        // Keep the bracket valid so the fallback step stays safe.
        if v < target {
            lo = x;
        } else {
            hi = x;
        }
        let candidate = x - (v - target) / d;
        // Fall back to bisection whenever Newton leaves the bracket
        // (flat derivative, overshoot) or produces a non-finite step.
        x = if candidate.is_finite() && candidate > lo && candidate < hi {
            candidate
        } else {
            0.5 * (lo + hi)
        };
    }

    x
}

//! Inverse-normal-CDF transform with stable tail approximations.
//!
//! Maps a `(log_cdf, log_sf)` pair to the standard-normal-space value
//! `z = Φ⁻¹(cdf)` and its log-derivative with respect to the underlying
//! input, `log |dz/dx| = log-deriv-of-Φ⁻¹ + log_pdf`.
//!
//! Four modes:
//! - [`InverseCdfMode::Isigmoid`]: `z = log_cdf - log_sf`, a logit-like
//!   surrogate that is stable everywhere without special-casing (not
//!   numerically identical to the exact inverse normal CDF).
//! - the `Inormal*` modes use the exact inverse normal CDF in the
//!   well-conditioned region `PADE_BOUND < cdf < 1 - PADE_BOUND` and a
//!   Pade-rational approximation of the inverse error function in the
//!   tails (`FullPade` uses the Pade form everywhere, `PartlyCrude` a
//!   cruder tail form). The derivative formulas are algebraically
//!   consistent with the value formulas.

use crate::math::{logsumexp2, LN_SQRT_2PI};
use gf_core::NumericEvents;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erf_inv;

/// CDF value below which (and symmetrically above `1 - bound`) the exact
/// inverse normal CDF is ill-conditioned and the Pade tail form is used.
pub const PADE_BOUND: f64 = 5e-8;

/// Constant of the Pade approximation to the inverse error function.
pub const PADE_A: f64 = 0.147;

/// Half-width of the `cdf ≈ 0.5` neighborhood in which the full-Pade
/// derivative is replaced by its analytic limit `log √(2π)`.
const HALF_WINDOW: f64 = 1e-5;

/// Which approximation maps `(log_cdf, log_sf)` to normal space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseCdfMode {
    /// `z = log_cdf - log_sf` (logit), stable with no special cases.
    Isigmoid,
    /// Exact inverse normal CDF inside the well-conditioned region,
    /// crude `sqrt(-2 log(cdf·sf)) - 0.4717` tail form outside.
    InormalPartlyCrude,
    /// Exact inverse normal CDF inside the well-conditioned region,
    /// Pade inverse-erf tail form outside.
    InormalPartlyPrecise,
    /// Pade inverse-erf form over the full CDF range.
    InormalFullPade,
}

/// The transform: a mode plus a cached standard normal.
#[derive(Debug, Clone)]
pub struct InverseNormal {
    mode: InverseCdfMode,
    standard_normal: Normal,
}

/// Pade tail quantities shared by the value and derivative formulas.
///
/// With `ln_fac = log(4·cdf·sf)`, `c = 2/(π·a)` and
/// `combined = c + ln_fac/2`, the Pade approximation gives
/// `|z| = sqrt(2·(sqrt(combined² - ln_fac/a) - combined))`.
struct PadeTerms {
    ln_fac: f64,
    combined: f64,
    /// `sqrt(combined² - ln_fac/a)`.
    root: f64,
}

impl PadeTerms {
    fn compute(log_cdf: f64, log_sf: f64) -> Self {
        let c = 2.0 / (std::f64::consts::PI * PADE_A);
        let ln_fac = log_cdf + log_sf + 4.0f64.ln();
        let combined = c + ln_fac / 2.0;
        let root = (combined * combined - ln_fac / PADE_A).sqrt();
        Self { ln_fac, combined, root }
    }

    /// `|z|` under the Pade approximation. Floating-point imprecision
    /// can push the inner argument slightly negative near `cdf = 0.5`;
    /// it is clamped to zero and recorded.
    fn magnitude(&self, events: &NumericEvents) -> f64 {
        let inner = 2.0 * (self.root - self.combined);
        if inner < 0.0 {
            if inner.is_finite() {
                events.record_clamped_sqrt(inner);
            }
            return 0.0;
        }
        inner.sqrt()
    }

    /// Log-derivative of `|z|` with respect to `cdf`, up to the
    /// `1/(cdf·sf)` and `|1 - 2·cdf|` factors applied by the caller.
    fn log_derivative_core(&self) -> f64 {
        let f = self.combined;
        let log_numerator = (self.root + 1.0 / PADE_A - f).ln();
        let log_denominator = 0.5 * 8.0f64.ln() + 0.5 * (self.root - f).ln() + self.root.ln();
        log_numerator - log_denominator
    }
}

impl InverseNormal {
    /// Build the transform for a mode.
    pub fn new(mode: InverseCdfMode) -> Self {
        let standard_normal =
            Normal::new(0.0, 1.0).expect("standard normal should be constructible");
        Self { mode, standard_normal }
    }

    /// The configured mode.
    pub fn mode(&self) -> InverseCdfMode {
        self.mode
    }

    /// Normal-space value `z` for a `(log_cdf, log_sf)` pair.
    pub fn value(&self, log_cdf: f64, log_sf: f64, events: &NumericEvents) -> f64 {
        match self.mode {
            InverseCdfMode::Isigmoid => log_cdf - log_sf,
            InverseCdfMode::InormalPartlyCrude => {
                match Region::classify(log_cdf, log_sf) {
                    Region::Well => self.standard_normal.inverse_cdf(log_cdf.exp()),
                    region => {
                        let magnitude = (-2.0 * (log_cdf + log_sf)).sqrt() - 0.4717;
                        region.signed(magnitude)
                    }
                }
            }
            InverseCdfMode::InormalPartlyPrecise => {
                match Region::classify(log_cdf, log_sf) {
                    Region::Well => self.standard_normal.inverse_cdf(log_cdf.exp()),
                    region => {
                        let magnitude = PadeTerms::compute(log_cdf, log_sf).magnitude(events);
                        region.signed(magnitude)
                    }
                }
            }
            InverseCdfMode::InormalFullPade => {
                let magnitude = PadeTerms::compute(log_cdf, log_sf).magnitude(events);
                if log_cdf <= log_sf { -magnitude } else { magnitude }
            }
        }
    }

    /// Log-derivative `log |dz/dx|` for a `(log_cdf, log_sf)` pair,
    /// given the underlying `log_pdf = log |d cdf/dx|`.
    ///
    /// Algebraically consistent with [`InverseNormal::value`]: a finite
    /// difference of `value` over `x` matches `exp(log_derivative)`.
    pub fn log_derivative(&self, log_cdf: f64, log_sf: f64, log_pdf: f64) -> f64 {
        match self.mode {
            InverseCdfMode::Isigmoid => logsumexp2(-log_sf, -log_cdf) + log_pdf,
            InverseCdfMode::InormalPartlyCrude => {
                match Region::classify(log_cdf, log_sf) {
                    Region::Well => {
                        let erfinv = erf_inv(2.0 * log_cdf.exp() - 1.0);
                        LN_SQRT_2PI + erfinv * erfinv + log_pdf
                    }
                    Region::Left | Region::Right => {
                        let ln_fac = log_cdf + log_sf;
                        -0.5 * (-2.0 * ln_fac).ln() - log_cdf - log_sf + log_pdf
                    }
                }
            }
            InverseCdfMode::InormalPartlyPrecise => {
                match Region::classify(log_cdf, log_sf) {
                    Region::Well => {
                        let erfinv = erf_inv(2.0 * log_cdf.exp() - 1.0);
                        LN_SQRT_2PI + erfinv * erfinv + log_pdf
                    }
                    Region::Left | Region::Right => {
                        pade_tail_log_derivative(log_cdf, log_sf) + log_pdf
                    }
                }
            }
            InverseCdfMode::InormalFullPade => {
                let cdf = log_cdf.exp();
                if (cdf - 0.5).abs() < HALF_WINDOW {
                    // d Φ⁻¹/d cdf at 0.5 is exactly √(2π); the rational
                    // form is 0/0-unstable in this neighborhood.
                    LN_SQRT_2PI + log_pdf
                } else {
                    pade_tail_log_derivative(log_cdf, log_sf) + log_pdf
                }
            }
        }
    }
}

/// Log-derivative of the Pade value form with respect to `cdf`, on a
/// log scale. Valid away from `cdf = 0.5`.
fn pade_tail_log_derivative(log_cdf: f64, log_sf: f64) -> f64 {
    let terms = PadeTerms::compute(log_cdf, log_sf);
    let cdf = log_cdf.exp();
    let sign_factor = if cdf <= 0.5 { 1.0 - 2.0 * cdf } else { 2.0 * cdf - 1.0 };
    terms.log_derivative_core() - log_cdf - log_sf + sign_factor.ln()
}

/// CDF region classification shared by the `Inormal*` partly modes.
enum Region {
    /// `cdf <= PADE_BOUND`.
    Left,
    /// `PADE_BOUND < cdf < 1 - PADE_BOUND`.
    Well,
    /// `cdf >= 1 - PADE_BOUND`.
    Right,
}

impl Region {
    fn classify(log_cdf: f64, log_sf: f64) -> Self {
        // The survival function resolves the right tail more precisely
        // than 1 - exp(log_cdf) would.
        if log_cdf.exp() <= PADE_BOUND {
            Region::Left
        } else if log_sf.exp() <= PADE_BOUND {
            Region::Right
        } else {
            Region::Well
        }
    }

    fn signed(&self, magnitude: f64) -> f64 {
        match self {
            Region::Left => -magnitude,
            Region::Right => magnitude,
            Region::Well => unreachable!("signed() is only used in tail regions"),
        }
    }
}

//! Smooth regulators mapping unconstrained parameters to valid ranges.
//!
//! Mixture widths, normalization weights, and skew exponents are learned
//! as unconstrained reals and mapped into their valid range by a strictly
//! monotonic, differentiable function evaluated in log space. The bounded
//! variant saturates smoothly at both ends via log-sum-exp instead of
//! overflowing; the floored variants only enforce a positive lower bound.

use crate::math::{log1pexp, logsumexp2, softplus};
use gf_core::{Error, Result};

/// A strictly monotonic map from an unconstrained raw parameter to a
/// valid value, returned in log space.
///
/// An optional hard clamp of the raw input before the smooth map acts as
/// a gradient-stabilization safety valve for extreme parameter regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regulator {
    /// Smooth saturation onto `(min, max)` in normal space:
    /// `log(min + (max-min) * σ-like(raw))`, all in log space.
    ///
    /// With `center` set to `ln(max-min)` the map behaves like a plain
    /// exponential for small outputs (raw 0 lands near the top of the
    /// range in σ terms); with `center = 0` it is uncentered.
    BoundedLog {
        /// `ln(max - min)`.
        ln_span: f64,
        /// `ln(min)`.
        ln_min: f64,
        /// Shift applied to `raw` inside the saturation term.
        center: f64,
        /// Optional `(lo, hi)` hard clamp on `raw`.
        clamp: Option<(f64, f64)>,
    },
    /// `log(softplus(raw) + floor)`: positive, asymptotically linear.
    SoftplusFloor {
        /// Additive lower bound in normal space.
        floor: f64,
        /// Optional `(lo, hi)` hard clamp on `raw`.
        clamp: Option<(f64, f64)>,
    },
    /// `log(exp(raw) + floor)`: positive, unbounded exponential growth.
    ExpFloor {
        /// Additive lower bound in normal space.
        floor: f64,
        /// Optional `(lo, hi)` hard clamp on `raw`.
        clamp: Option<(f64, f64)>,
    },
}

impl Regulator {
    /// Smoothly bounded regulator onto `(min_val, max_val)` in normal
    /// space. Both bounds must be positive with `min_val < max_val`.
    ///
    /// `centered` shifts the map so that small raw values behave like a
    /// plain exponential (used for widths and skew exponents; the skew
    /// range `[0.1, 9.0]` then maps raw 0 to an exponent of ≈ 1).
    pub fn bounded_log(
        min_val: f64,
        max_val: f64,
        centered: bool,
        clamp: Option<(f64, f64)>,
    ) -> Result<Self> {
        if !min_val.is_finite() || min_val <= 0.0 {
            return Err(Error::Config(format!(
                "bounded regulator requires min_val > 0, got {min_val}"
            )));
        }
        if !max_val.is_finite() || max_val <= min_val {
            return Err(Error::Config(format!(
                "bounded regulator requires max_val > min_val, got ({min_val}, {max_val})"
            )));
        }
        let ln_span = (max_val - min_val).ln();
        Ok(Self::BoundedLog {
            ln_span,
            ln_min: min_val.ln(),
            center: if centered { ln_span } else { 0.0 },
            clamp,
        })
    }

    /// Softplus-with-floor regulator. The floor must be positive.
    pub fn softplus_floor(floor: f64, clamp: Option<(f64, f64)>) -> Result<Self> {
        if !floor.is_finite() || floor <= 0.0 {
            return Err(Error::Config(format!("regulator floor must be > 0, got {floor}")));
        }
        Ok(Self::SoftplusFloor { floor, clamp })
    }

    /// Exponential-with-floor regulator. The floor must be positive.
    pub fn exp_floor(floor: f64, clamp: Option<(f64, f64)>) -> Result<Self> {
        if !floor.is_finite() || floor <= 0.0 {
            return Err(Error::Config(format!("regulator floor must be > 0, got {floor}")));
        }
        Ok(Self::ExpFloor { floor, clamp })
    }

    /// Regulated value in log space.
    #[inline]
    pub fn regulate_log(&self, raw: f64) -> f64 {
        match *self {
            Self::BoundedLog { ln_span, ln_min, center, clamp } => {
                let x = apply_clamp(raw, clamp);
                // log(min + span * sigmoid(x - center + ...)) assembled
                // purely from log-sum-exp terms.
                logsumexp2(ln_span - log1pexp(center - x), ln_min)
            }
            Self::SoftplusFloor { floor, clamp } => {
                let x = apply_clamp(raw, clamp);
                (softplus(x) + floor).ln()
            }
            Self::ExpFloor { floor, clamp } => {
                let x = apply_clamp(raw, clamp);
                logsumexp2(x, floor.ln())
            }
        }
    }

    /// Regulated value in normal space.
    #[inline]
    pub fn regulate(&self, raw: f64) -> f64 {
        self.regulate_log(raw).exp()
    }
}

#[inline]
fn apply_clamp(raw: f64, clamp: Option<(f64, f64)>) -> f64 {
    match clamp {
        Some((lo, hi)) => raw.clamp(lo, hi),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounded_log_strictly_inside_range() {
        let reg = Regulator::bounded_log(0.01, 100.0, true, None).unwrap();
        for raw in [-1e6, -50.0, -1.0, 0.0, 1.0, 50.0, 1e6] {
            let w = reg.regulate(raw);
            assert!(w > 0.01 && w < 100.0, "raw={raw} gave {w}");
        }
    }

    #[test]
    fn test_bounded_log_monotonic() {
        let reg = Regulator::bounded_log(0.1, 9.0, true, None).unwrap();
        let mut prev = f64::NEG_INFINITY;
        let mut raw = -30.0;
        while raw <= 30.0 {
            let v = reg.regulate_log(raw);
            assert!(v > prev, "not increasing at raw={raw}");
            prev = v;
            raw += 0.25;
        }
    }

    #[test]
    fn test_bounded_log_saturation_limits() {
        let reg = Regulator::bounded_log(0.01, 100.0, true, None).unwrap();
        assert_relative_eq!(reg.regulate(-1e8), 0.01, epsilon = 1e-9);
        assert_relative_eq!(reg.regulate(1e8), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_skew_range_maps_zero_to_unit_exponent() {
        // [0.1, 9.0] centered: raw 0 should land near exponent 1.
        let reg = Regulator::bounded_log(0.1, 9.0, true, None).unwrap();
        assert_relative_eq!(reg.regulate(0.0), 1.0, epsilon = 2e-3);
    }

    #[test]
    fn test_clamp_freezes_outside_window() {
        let clamp = Some((-2.0, 2.0));
        let reg = Regulator::bounded_log(0.01, 100.0, true, clamp).unwrap();
        assert_eq!(reg.regulate_log(5.0), reg.regulate_log(2.0));
        assert_eq!(reg.regulate_log(-9.0), reg.regulate_log(-2.0));
    }

    #[test]
    fn test_softplus_floor_positive_and_monotonic() {
        let reg = Regulator::softplus_floor(0.01, None).unwrap();
        let mut prev = f64::NEG_INFINITY;
        for raw in [-40.0, -3.0, 0.0, 3.0, 40.0] {
            let v = reg.regulate_log(raw);
            assert!(v > prev);
            assert!(v.exp() > 0.01);
            prev = v;
        }
    }

    #[test]
    fn test_exp_floor_matches_naive() {
        let reg = Regulator::exp_floor(0.01, None).unwrap();
        for raw in [-5.0, 0.0, 3.0] {
            assert_relative_eq!(reg.regulate(raw), raw.exp() + 0.01, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(Regulator::bounded_log(0.0, 1.0, false, None).is_err());
        assert!(Regulator::bounded_log(-1.0, 1.0, false, None).is_err());
        assert!(Regulator::bounded_log(2.0, 2.0, false, None).is_err());
        assert!(Regulator::bounded_log(3.0, 2.0, false, None).is_err());
        assert!(Regulator::softplus_floor(0.0, None).is_err());
        assert!(Regulator::exp_floor(-0.5, None).is_err());
    }
}

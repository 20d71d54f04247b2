//! Small numerically-stable math utilities used across probability code.

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Stable `log(1 + exp(x))`.
///
/// Branchless: `log(1+exp(x)) = max(x,0) + log(1+exp(-|x|))`.
#[inline]
pub fn log1pexp(x: f64) -> f64 {
    let e = (-x.abs()).exp(); // always in (0, 1], no overflow
    x.max(0.0) + e.ln_1p()
}

/// Stable softplus: `log(1 + exp(x))`.
#[inline]
pub fn softplus(x: f64) -> f64 {
    log1pexp(x)
}

/// Stable sigmoid: `1 / (1 + exp(-x))`.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    let recip = 1.0 / (1.0 + e);
    if x >= 0.0 { recip } else { e * recip }
}

/// Stable `log(sigmoid(x))`.
#[inline]
pub fn log_sigmoid(x: f64) -> f64 {
    -log1pexp(-x)
}

/// Stable `log(1 - exp(-y))` for `y > 0`.
///
/// Splits at `ln 2`: small `y` goes through `expm1` to avoid
/// cancellation, large `y` through `ln_1p` to avoid underflow.
#[inline]
pub fn log1mexp(y: f64) -> f64 {
    debug_assert!(y >= 0.0);
    if y < std::f64::consts::LN_2 { (-(-y).exp_m1()).ln() } else { (-(-y).exp()).ln_1p() }
}

/// Stable `log(exp(a) + exp(b))`.
#[inline]
pub fn logsumexp2(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    if m == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// Online log-sum-exp accumulator: maintains `(m, s)` such that the
/// running total is `m + ln(s)`.
///
/// Components arrive one at a time, so the mixture engine never
/// materializes a per-component buffer.
#[derive(Debug, Clone, Copy)]
pub struct LogSumExp {
    m: f64,
    s: f64,
}

impl LogSumExp {
    /// Empty accumulator (`total() == -inf`).
    #[inline]
    pub fn new() -> Self {
        Self { m: f64::NEG_INFINITY, s: 0.0 }
    }

    /// Fold in one term `t`, i.e. accumulate `exp(t)`.
    #[inline]
    pub fn add(&mut self, t: f64) {
        if t == f64::NEG_INFINITY {
            return;
        }
        if t <= self.m {
            self.s += (t - self.m).exp();
        } else {
            self.s = self.s * (self.m - t).exp() + 1.0;
            self.m = t;
        }
    }

    /// `log(Σ exp(t_i))` over everything added so far.
    #[inline]
    pub fn total(&self) -> f64 {
        if self.m == f64::NEG_INFINITY { f64::NEG_INFINITY } else { self.m + self.s.ln() }
    }
}

impl Default for LogSumExp {
    fn default() -> Self {
        Self::new()
    }
}

/// `log(Σ exp(t_i))` over a slice.
pub fn logsumexp(terms: &[f64]) -> f64 {
    let mut acc = LogSumExp::new();
    for &t in terms {
        acc.add(t);
    }
    acc.total()
}

/// Exponential with a conservative clamp to avoid overflow/underflow.
///
/// Newton steps divide by `exp(log_derivative)`; clamping both sides
/// keeps the quotient finite so the safeguarded iteration can recover.
#[inline]
pub fn exp_clamped(x: f64) -> f64 {
    x.clamp(-700.0, 700.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log1pexp_matches_naive_moderate_values() {
        for x in [-10.0, -2.0, -0.1, 0.0, 0.1, 2.0, 10.0] {
            assert_relative_eq!(log1pexp(x), (1.0 + x.exp()).ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log1pexp_is_finite_extremes() {
        for x in [-1e6, -100.0, 100.0, 1e6] {
            assert!(log1pexp(x).is_finite());
        }
        assert_relative_eq!(log1pexp(1e6), 1e6, epsilon = 1e-6);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [-50.0, -1.0, 0.0, 0.3, 7.0] {
            assert_relative_eq!(sigmoid(x) + sigmoid(-x), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_log_sigmoid_is_negated_softplus() {
        // The identity the mixture CDF forms rely on.
        for x in [-700.0, -3.0, 0.0, 0.5, 40.0] {
            assert_eq!(log_sigmoid(x), -softplus(-x));
            assert_relative_eq!(log_sigmoid(x), sigmoid(x).ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log1mexp_matches_naive() {
        // Only moderate y: the naive form cancels for tiny arguments,
        // which test_log1mexp_tiny_argument_no_cancellation covers.
        for y in [0.1f64, 0.5, 1.0, 5.0, 40.0] {
            let naive = (1.0 - (-y).exp()).ln();
            assert_relative_eq!(log1mexp(y), naive, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_log1mexp_tiny_argument_no_cancellation() {
        // 1 - exp(-1e-300) cancels to 0 naively; the stable form keeps
        // log1mexp(y) ≈ ln(y).
        let y = 1e-300;
        assert_relative_eq!(log1mexp(y), y.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_logsumexp2_matches_slice() {
        let a = -3.0;
        let b = 4.5;
        assert_relative_eq!(logsumexp2(a, b), logsumexp(&[a, b]), epsilon = 1e-14);
    }

    #[test]
    fn test_online_logsumexp_matches_naive() {
        let terms: [f64; 5] = [-700.0, -1.0, 0.0, 2.5, 3.0];
        let naive = terms.iter().map(|t| t.exp()).sum::<f64>().ln();
        assert_relative_eq!(logsumexp(&terms), naive, epsilon = 1e-12);
    }

    #[test]
    fn test_logsumexp_empty_and_neg_inf() {
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
        assert_eq!(logsumexp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert_relative_eq!(logsumexp(&[f64::NEG_INFINITY, 0.0]), 0.0, epsilon = 1e-15);
    }
}

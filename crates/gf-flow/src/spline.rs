//! Monotonic rational-quadratic spline with linear tails.
//!
//! One spline covers one dimension: `K` segments on a learned bounding
//! box, knot positions from softmax-normalized logits, strictly
//! positive knot derivatives from softplus logits. Outside the box the
//! map continues linearly with the edge derivative as slope, so the
//! transform is a bijection on all of R and its inverse is closed form
//! (per-segment quadratic), unlike the mixture path which root-solves.

use gf_prob::math::{logsumexp, softplus};

/// Keeps softmax-normalized segments away from zero width so the
/// segment slope `h / w` stays bounded.
const MIN_KNOT_FRACTION: f64 = 1e-3;
/// Floor on knot derivatives after softplus.
const MIN_DERIVATIVE: f64 = 1e-6;

/// A materialized spline for a single dimension.
#[derive(Debug, Clone)]
pub struct SplineDim {
    /// `K + 1` knot inputs, strictly increasing.
    xs: Vec<f64>,
    /// `K + 1` knot outputs, strictly increasing.
    ys: Vec<f64>,
    /// `K + 1` positive knot derivatives.
    derivs: Vec<f64>,
}

impl SplineDim {
    /// Build from raw per-dimension logits.
    ///
    /// `width_logits` and `height_logits` have length `K`,
    /// `derivative_logits` length `K + 1`, and `boundaries` holds the
    /// four raw box corners. Mismatched raw corners are swapped rather
    /// than rejected, so any real values yield a valid box.
    pub fn from_raw(
        width_logits: &[f64],
        height_logits: &[f64],
        derivative_logits: &[f64],
        boundaries: &[f64; 4],
    ) -> Self {
        debug_assert_eq!(width_logits.len(), height_logits.len());
        debug_assert_eq!(width_logits.len() + 1, derivative_logits.len());

        let left = boundaries[0].min(boundaries[1]);
        let mut right = boundaries[0].max(boundaries[1]);
        let bottom = boundaries[2].min(boundaries[3]);
        let mut top = boundaries[2].max(boundaries[3]);
        // Collapsed boxes get a minimal span instead of a zero one.
        if right - left < 1e-6 {
            right = left + 1e-6;
        }
        if top - bottom < 1e-6 {
            top = bottom + 1e-6;
        }

        let xs = knot_positions(width_logits, left, right);
        let ys = knot_positions(height_logits, bottom, top);
        let derivs = derivative_logits
            .iter()
            .map(|&d| MIN_DERIVATIVE + softplus(d))
            .collect();
        Self { xs, ys, derivs }
    }

    /// `(y, log dy/dx)` at `x`.
    pub fn forward(&self, x: f64) -> (f64, f64) {
        let last = self.xs.len() - 1;
        if x <= self.xs[0] {
            let d = self.derivs[0];
            return (self.ys[0] + d * (x - self.xs[0]), d.ln());
        }
        if x >= self.xs[last] {
            let d = self.derivs[last];
            return (self.ys[last] + d * (x - self.xs[last]), d.ln());
        }
        let bin = self.xs.partition_point(|&knot| knot <= x) - 1;
        let seg = self.segment(bin);
        let xi = (x - self.xs[bin]) / seg.w;
        let omx = 1.0 - xi;
        let denom = seg.s + seg.excess * xi * omx;
        let y = self.ys[bin] + seg.h * (seg.s * xi * xi + seg.d_lo * xi * omx) / denom;
        (y, seg.log_derivative(xi))
    }

    /// `(x, log dy/dx at x)` such that `forward(x).0 == y`.
    pub fn inverse(&self, y: f64) -> (f64, f64) {
        let last = self.ys.len() - 1;
        if y <= self.ys[0] {
            let d = self.derivs[0];
            return (self.xs[0] + (y - self.ys[0]) / d, d.ln());
        }
        if y >= self.ys[last] {
            let d = self.derivs[last];
            return (self.xs[last] + (y - self.ys[last]) / d, d.ln());
        }
        let bin = self.ys.partition_point(|&knot| knot <= y) - 1;
        let seg = self.segment(bin);
        let y_rel = y - self.ys[bin];

        // Quadratic in xi, solved with the root that stays in [0, 1]
        // even when `a` degenerates to zero.
        let a = seg.h * (seg.s - seg.d_lo) + y_rel * seg.excess;
        let b = seg.h * seg.d_lo - y_rel * seg.excess;
        let c = -seg.s * y_rel;
        let disc = (b * b - 4.0 * a * c).max(0.0);
        let xi = 2.0 * c / (-b - disc.sqrt());
        let xi = xi.clamp(0.0, 1.0);

        (self.xs[bin] + xi * seg.w, seg.log_derivative(xi))
    }
}

struct Segment {
    w: f64,
    h: f64,
    s: f64,
    d_lo: f64,
    d_hi: f64,
    /// `d_lo + d_hi - 2 s`, shared by value and derivative formulas.
    excess: f64,
}

impl Segment {
    fn log_derivative(&self, xi: f64) -> f64 {
        let omx = 1.0 - xi;
        let denom = self.s + self.excess * xi * omx;
        let num = self.s
            * self.s
            * (self.d_hi * xi * xi + 2.0 * self.s * xi * omx + self.d_lo * omx * omx);
        num.ln() - 2.0 * denom.ln()
    }
}

impl SplineDim {
    fn segment(&self, bin: usize) -> Segment {
        let w = self.xs[bin + 1] - self.xs[bin];
        let h = self.ys[bin + 1] - self.ys[bin];
        let s = h / w;
        let d_lo = self.derivs[bin];
        let d_hi = self.derivs[bin + 1];
        Segment { w, h, s, d_lo, d_hi, excess: d_lo + d_hi - 2.0 * s }
    }
}

/// Cumulative knot positions from softmax-normalized logits, with a
/// floor fraction per segment.
fn knot_positions(logits: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let k = logits.len();
    let span = hi - lo;
    let norm = logsumexp(logits);
    let scale = 1.0 - k as f64 * MIN_KNOT_FRACTION;
    let mut out = Vec::with_capacity(k + 1);
    let mut acc = lo;
    out.push(acc);
    for &l in logits {
        acc += span * (MIN_KNOT_FRACTION + scale * (l - norm).exp());
        out.push(acc);
    }
    // Close the last knot exactly despite accumulated rounding.
    out[k] = hi;
    out
}

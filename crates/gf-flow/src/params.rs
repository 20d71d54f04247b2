//! Flat parameter layout and raw-to-usable parameter resolution.
//!
//! All layer parameters live in one flat vector: rotation parameters
//! first, then the nonlinearity blocks. Mixture blocks are stored
//! component-major (component `k`, dimension `j` at `k * dim + j`);
//! spline blocks are dimension-major (`j * K + k`). Resolution applies
//! the regulators once per evaluation and transposes the mixture blocks
//! into dimension-contiguous scratch vectors.

use std::ops::Range;

use crate::options::{LayerOptions, NonlinearityKind};
use gf_core::{Error, Result};
use gf_prob::Regulator;

/// Where evaluation reads its parameters from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSource {
    /// A single parameter vector owned by the layer.
    Permanent(Vec<f64>),
    /// One parameter row per batch row, supplied at call time.
    Amortized,
}

/// Ranges of the nonlinearity blocks inside the flat vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonlinearityLayout {
    /// Skew-logistic mixture blocks, component-major.
    Mixture {
        /// Component means.
        means: Range<usize>,
        /// Raw width parameters (become widths through the regulator).
        log_widths: Range<usize>,
        /// Raw weight parameters; absent for a uniform mixture.
        log_weights: Option<Range<usize>>,
        /// Raw skew-exponent parameters; absent with skewness off.
        log_skew_exponents: Option<Range<usize>>,
    },
    /// Rational-quadratic spline blocks, dimension-major.
    Spline {
        /// Segment width logits, `K` per dimension.
        log_widths: Range<usize>,
        /// Segment height logits, `K` per dimension.
        log_heights: Range<usize>,
        /// Knot derivative logits, `K + 1` per dimension.
        derivative_logits: Range<usize>,
        /// Raw bounding-box corners, 4 per dimension.
        boundaries: Range<usize>,
    },
}

/// Complete flat layout for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    /// Target dimension.
    pub dimension: usize,
    /// Mixture components (or spline segments) per dimension.
    pub components: usize,
    /// Rotation parameter block, always first.
    pub rotation: Range<usize>,
    /// Nonlinearity blocks following the rotation block.
    pub nonlinearity: NonlinearityLayout,
    /// Total flat parameter count.
    pub total: usize,
}

impl ParamLayout {
    /// Lay out the flat vector for a dimension, a rotation block size,
    /// and the options' nonlinearity shape.
    pub fn new(dimension: usize, rotation_params: usize, opts: &LayerOptions) -> Self {
        let dim = dimension;
        let k = opts.num_components;
        let mut cursor = rotation_params;
        let rotation = 0..cursor;

        let nonlinearity = match opts.nonlinearity {
            NonlinearityKind::SkewLogisticMixture => {
                let means = take(&mut cursor, dim * k);
                let log_widths = take(&mut cursor, dim * k);
                let log_weights = opts.fit_normalization.then(|| take(&mut cursor, dim * k));
                let log_skew_exponents = opts.add_skewness.then(|| take(&mut cursor, dim * k));
                NonlinearityLayout::Mixture { means, log_widths, log_weights, log_skew_exponents }
            }
            NonlinearityKind::RationalQuadraticSpline => {
                let log_widths = take(&mut cursor, dim * k);
                let log_heights = take(&mut cursor, dim * k);
                let derivative_logits = take(&mut cursor, dim * (k + 1));
                let boundaries = take(&mut cursor, dim * 4);
                NonlinearityLayout::Spline { log_widths, log_heights, derivative_logits, boundaries }
            }
        };

        Self { dimension: dim, components: k, rotation, nonlinearity, total: cursor }
    }
}

fn take(cursor: &mut usize, len: usize) -> Range<usize> {
    let start = *cursor;
    *cursor += len;
    start..*cursor
}

/// Regulated, dimension-contiguous mixture parameters for one
/// parameter row. Slices for dimension `j` cover `[j * K, (j+1) * K)`.
#[derive(Debug, Clone)]
pub struct ResolvedMixture {
    /// Component means.
    pub means: Vec<f64>,
    /// Regulated widths, log space.
    pub log_widths: Vec<f64>,
    /// Unnormalized log weights (zeros for a uniform mixture).
    pub log_weights: Vec<f64>,
    /// Regulated skew exponents, log space (zeros with skewness off).
    pub log_skew_exponents: Vec<f64>,
    /// `+1.0` / `-1.0` per component; shared across dimensions.
    pub skew_signs: Vec<f64>,
}

impl ResolvedMixture {
    /// Per-component slices for dimension `j` of a `K = k` mixture.
    pub fn dim(&self, j: usize, k: usize) -> (&[f64], &[f64], &[f64], &[f64]) {
        let r = j * k..(j + 1) * k;
        (
            &self.means[r.clone()],
            &self.log_widths[r.clone()],
            &self.log_weights[r.clone()],
            &self.log_skew_exponents[r],
        )
    }
}

/// Turns raw flat parameters into regulated mixture parameters.
///
/// Built once per layer; holds the regulators and the fixed skew sign
/// pattern (second half of the components negative).
#[derive(Debug, Clone)]
pub struct MixtureResolver {
    layout: ParamLayout,
    width: Regulator,
    normalization: Option<Regulator>,
    skew: Option<Regulator>,
    skew_signs: Vec<f64>,
}

impl MixtureResolver {
    /// Build the resolver, deriving the regulators from the options.
    pub fn new(layout: ParamLayout, opts: &LayerOptions) -> Result<Self> {
        if !matches!(layout.nonlinearity, NonlinearityLayout::Mixture { .. }) {
            return Err(Error::Config("mixture resolver requires a mixture layout".into()));
        }
        // Softplus is asymptotically linear, so its raw clamp caps at
        // ln(width_max) exactly; the exponential maps get headroom.
        let clamp_lo = (0.01 * opts.width_min).ln();
        let width = if opts.softplus_for_width {
            let clamp = opts.clamp_widths.then(|| (clamp_lo, opts.width_max.ln()));
            Regulator::softplus_floor(opts.width_min, clamp)?
        } else {
            let clamp = opts.clamp_widths.then(|| (clamp_lo, 3.0 * opts.width_max.ln()));
            if opts.width_smooth_saturation {
                Regulator::bounded_log(opts.width_min, opts.width_max, true, clamp)?
            } else {
                Regulator::exp_floor(opts.width_min, clamp)?
            }
        };
        let normalization = if opts.regulate_normalization {
            Some(Regulator::bounded_log(1.0, 100.0, false, None)?)
        } else {
            None
        };
        let skew = if opts.add_skewness {
            Some(Regulator::bounded_log(0.1, 9.0, true, None)?)
        } else {
            None
        };
        let k = layout.components;
        let mut skew_signs = vec![1.0; k];
        for sign in skew_signs.iter_mut().skip(k / 2) {
            *sign = -1.0;
        }
        Ok(Self { layout, width, normalization, skew, skew_signs })
    }

    /// The layout this resolver was built for.
    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// `+1.0` / `-1.0` per component; constant across dimensions.
    pub fn skew_signs(&self) -> &[f64] {
        &self.skew_signs
    }

    /// Resolve one flat parameter row. The caller has already validated
    /// `raw.len() == layout.total`.
    pub fn resolve(&self, raw: &[f64]) -> ResolvedMixture {
        let dim = self.layout.dimension;
        let k = self.layout.components;
        let (means_r, widths_r, weights_r, skews_r) = match &self.layout.nonlinearity {
            NonlinearityLayout::Mixture { means, log_widths, log_weights, log_skew_exponents } => {
                (means, log_widths, log_weights, log_skew_exponents)
            }
            NonlinearityLayout::Spline { .. } => unreachable!("checked at construction"),
        };

        let mut out = ResolvedMixture {
            means: vec![0.0; dim * k],
            log_widths: vec![0.0; dim * k],
            log_weights: vec![0.0; dim * k],
            log_skew_exponents: vec![0.0; dim * k],
            skew_signs: self.skew_signs.clone(),
        };

        // Component-major storage to dimension-major scratch.
        let means_raw = &raw[means_r.clone()];
        let widths_raw = &raw[widths_r.clone()];
        for comp in 0..k {
            for j in 0..dim {
                let src = comp * dim + j;
                let dst = j * k + comp;
                out.means[dst] = means_raw[src];
                out.log_widths[dst] = self.width.regulate_log(widths_raw[src]);
            }
        }
        if let Some(r) = weights_r {
            let weights_raw = &raw[r.clone()];
            for comp in 0..k {
                for j in 0..dim {
                    let v = weights_raw[comp * dim + j];
                    out.log_weights[j * k + comp] = match &self.normalization {
                        Some(reg) => reg.regulate_log(v),
                        None => v,
                    };
                }
            }
        }
        if let (Some(r), Some(reg)) = (skews_r, self.skew.as_ref()) {
            let skews_raw = &raw[r.clone()];
            for comp in 0..k {
                for j in 0..dim {
                    out.log_skew_exponents[j * k + comp] =
                        reg.regulate_log(skews_raw[comp * dim + j]);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn opts() -> LayerOptions {
        LayerOptions { num_components: 3, ..Default::default() }
    }

    #[test]
    fn test_mixture_layout_totals() {
        let base = opts();
        let layout = ParamLayout::new(2, 4, &base);
        // 4 rotation + 2*3 means + 2*3 widths.
        assert_eq!(layout.total, 16);

        let full = LayerOptions {
            fit_normalization: true,
            regulate_normalization: true,
            add_skewness: true,
            ..opts()
        };
        let layout = ParamLayout::new(2, 4, &full);
        assert_eq!(layout.total, 4 + 4 * 6);
        match layout.nonlinearity {
            NonlinearityLayout::Mixture { log_weights, log_skew_exponents, .. } => {
                assert!(log_weights.is_some());
                assert!(log_skew_exponents.is_some());
            }
            NonlinearityLayout::Spline { .. } => panic!("expected mixture layout"),
        }
    }

    #[test]
    fn test_spline_layout_totals() {
        let spline = LayerOptions {
            nonlinearity: NonlinearityKind::RationalQuadraticSpline,
            ..opts()
        };
        let layout = ParamLayout::new(2, 0, &spline);
        // Per dim: 3 widths + 3 heights + 4 derivatives + 4 boundaries.
        assert_eq!(layout.total, 2 * (3 + 3 + 4 + 4));
    }

    #[test]
    fn test_skew_signs_half_split() {
        let o = LayerOptions { num_components: 5, add_skewness: true, ..Default::default() };
        let layout = ParamLayout::new(2, 0, &o);
        let resolver = MixtureResolver::new(layout, &o).unwrap();
        assert_eq!(resolver.skew_signs(), &[1.0, 1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_resolve_transposes_component_major() {
        let o = opts();
        let layout = ParamLayout::new(2, 0, &o);
        let resolver = MixtureResolver::new(layout.clone(), &o).unwrap();
        // means block: component-major [k0j0, k0j1, k1j0, k1j1, k2j0, k2j1]
        let mut raw = vec![0.0; layout.total];
        raw[..6].copy_from_slice(&[10.0, 20.0, 11.0, 21.0, 12.0, 22.0]);
        let resolved = resolver.resolve(&raw);
        let (means0, ..) = resolved.dim(0, 3);
        assert_eq!(means0, &[10.0, 11.0, 12.0]);
        let (means1, ..) = resolved.dim(1, 3);
        assert_eq!(means1, &[20.0, 21.0, 22.0]);
    }

    #[test]
    fn test_resolve_regulates_widths() {
        let o = opts();
        let layout = ParamLayout::new(1, 0, &o);
        let resolver = MixtureResolver::new(layout.clone(), &o).unwrap();
        let mut raw = vec![0.0; layout.total];
        raw[3] = -1e4;
        raw[4] = 0.0;
        raw[5] = 1e4;
        let resolved = resolver.resolve(&raw);
        let (_, widths, ..) = resolved.dim(0, 3);
        assert_relative_eq!(widths[0].exp(), o.width_min, epsilon = 1e-9);
        assert!(widths[2].exp() < o.width_max);
        assert!(widths[1] > widths[0] && widths[2] > widths[1]);
    }

    #[test]
    fn test_softplus_width_clamp_caps_at_width_max() {
        let o = LayerOptions { softplus_for_width: true, clamp_widths: true, ..opts() };
        let layout = ParamLayout::new(1, 0, &o);
        let resolver = MixtureResolver::new(layout.clone(), &o).unwrap();
        let mut raw = vec![0.0; layout.total];
        // Raw widths beyond ln(width_max) freeze at the cap.
        raw[3] = 1e6;
        raw[4] = o.width_max.ln();
        raw[5] = 0.0;
        let resolved = resolver.resolve(&raw);
        let (_, widths, ..) = resolved.dim(0, 3);
        assert_eq!(widths[0], widths[1]);
        assert!(widths[2] < widths[1]);
    }

    #[test]
    fn test_uniform_weights_without_fit_normalization() {
        let o = opts();
        let layout = ParamLayout::new(2, 0, &o);
        let resolver = MixtureResolver::new(layout.clone(), &o).unwrap();
        let raw = vec![0.5; layout.total];
        let resolved = resolver.resolve(&raw);
        assert!(resolved.log_weights.iter().all(|&w| w == 0.0));
        assert!(resolved.log_skew_exponents.iter().all(|&e| e == 0.0));
    }
}

//! The Gaussianization flow layer.
//!
//! Forward direction maps target space to latent space: the inverse
//! rotation is applied first, then each coordinate passes through its
//! nonlinearity (mixture CDF into the inverse normal CDF, or a
//! rational-quadratic spline). The inverse direction undoes the
//! nonlinearity per coordinate (numeric root solve for the mixture,
//! closed form for the spline) and then applies the rotation. The
//! rotation is volume preserving, so only the nonlinearity contributes
//! to the accumulated log-determinant.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::options::{LayerOptions, NonlinearityKind};
use crate::params::{
    MixtureResolver, NonlinearityLayout, ParamLayout, ParameterSource, ResolvedMixture,
};
use crate::rotation::{Rotation, RotationState};
use crate::solver::invert_monotone;
use crate::spline::SplineDim;
use gf_core::{Error, FlowTransform, NumericEvents, Result};
use gf_prob::inverse_normal::InverseNormal;
use gf_prob::math::exp_clamped;
use gf_prob::skew_logistic::mixture_log_quantities;

/// Raw derivative-logit value whose softplus is 1, used to initialize
/// spline knot derivatives at the identity-like slope.
const UNIT_DERIVATIVE_LOGIT: f64 = 0.54135;

/// A parametrized bijection between a target space and a standard
/// normal latent space.
#[derive(Debug)]
pub struct GaussianizationLayer {
    dimension: usize,
    options: LayerOptions,
    rotation: Rotation,
    layout: ParamLayout,
    engine: Engine,
    inverse_normal: InverseNormal,
    source: ParameterSource,
    events: NumericEvents,
}

/// Which nonlinearity machinery this layer runs.
#[derive(Debug)]
enum Engine {
    Mixture(MixtureResolver),
    Spline,
}

/// Materialized per-row evaluation state.
struct RowContext {
    state: RotationState,
    nonlin: RowNonlinearity,
}

enum RowNonlinearity {
    Mixture(ResolvedMixture),
    Spline(Vec<SplineDim>),
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Inverse,
}

impl GaussianizationLayer {
    /// Layer whose parameters arrive per batch row via `extra_params`.
    pub fn amortized(dimension: usize, options: LayerOptions) -> Result<Self> {
        Self::build(dimension, options, ParameterSource::Amortized)
    }

    /// Layer with a fixed, caller-supplied parameter vector.
    pub fn with_parameters(
        dimension: usize,
        options: LayerOptions,
        params: Vec<f64>,
    ) -> Result<Self> {
        let mut layer = Self::build(dimension, options, ParameterSource::Amortized)?;
        layer.set_parameters(params)?;
        Ok(layer)
    }

    /// Layer with freshly initialized persistent parameters: random
    /// rotation directions and mixture means, widths at the
    /// Silverman-style bandwidth for the component count, everything
    /// else at its neutral value.
    pub fn initialized<R: Rng + ?Sized>(
        dimension: usize,
        options: LayerOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let mut layer = Self::build(dimension, options, ParameterSource::Amortized)?;
        let init = layer.initial_parameters(rng);
        layer.source = ParameterSource::Permanent(init);
        Ok(layer)
    }

    fn build(dimension: usize, options: LayerOptions, source: ParameterSource) -> Result<Self> {
        options.validate(dimension)?;
        let rotation = Rotation::new(options.rotation, dimension)?;
        let layout = ParamLayout::new(dimension, rotation.param_count(), &options);
        let engine = match options.nonlinearity {
            NonlinearityKind::SkewLogisticMixture => {
                Engine::Mixture(MixtureResolver::new(layout.clone(), &options)?)
            }
            NonlinearityKind::RationalQuadraticSpline => Engine::Spline,
        };
        let inverse_normal = InverseNormal::new(options.inverse_cdf);
        log::debug!(
            "gaussianization layer: dim={dimension}, components={}, parameters={}",
            options.num_components,
            layout.total
        );
        Ok(Self {
            dimension,
            options,
            rotation,
            layout,
            engine,
            inverse_normal,
            source,
            events: NumericEvents::new(),
        })
    }

    /// Flat parameter layout (rotation block first, then nonlinearity
    /// blocks), for callers assembling amortized parameter rows.
    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// Constructor options.
    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    /// Numeric-event counters for this layer.
    pub fn events(&self) -> &NumericEvents {
        &self.events
    }

    /// Persistent parameters, if the layer owns any.
    pub fn parameters(&self) -> Option<&[f64]> {
        match &self.source {
            ParameterSource::Permanent(p) => Some(p),
            ParameterSource::Amortized => None,
        }
    }

    /// Replace the persistent parameter vector.
    pub fn set_parameters(&mut self, params: Vec<f64>) -> Result<()> {
        if params.len() != self.layout.total {
            return Err(Error::Shape(format!(
                "layer expects {} parameters, got {}",
                self.layout.total,
                params.len()
            )));
        }
        self.source = ParameterSource::Permanent(params);
        Ok(())
    }

    /// Default initial parameter vector.
    ///
    /// Householder reflection directions and mixture means are standard
    /// normal draws; all other rotation modes start at the identity
    /// (their zero point). Mixture width raws start at the kernel
    /// bandwidth `(4 √π / (π⁴ K))^{1/5}` in log space; weight raws at
    /// one, skew raws at zero. Spline logits start uniform with unit
    /// knot derivatives on the box `[-1, 1] × [-1, 1]`.
    pub fn initial_parameters<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut p = vec![0.0; self.layout.total];
        if !self.rotation.identity_at_zero() {
            for slot in &mut p[self.layout.rotation.clone()] {
                *slot = rng.sample(StandardNormal);
            }
        }
        match &self.layout.nonlinearity {
            NonlinearityLayout::Mixture { means, log_widths, log_weights, log_skew_exponents } => {
                for slot in &mut p[means.clone()] {
                    *slot = rng.sample(StandardNormal);
                }
                let init_log_width = init_log_width(self.layout.components);
                for slot in &mut p[log_widths.clone()] {
                    *slot = init_log_width;
                }
                if let Some(r) = log_weights {
                    for slot in &mut p[r.clone()] {
                        *slot = 1.0;
                    }
                }
                // Skew raws stay at zero: exponent ≈ 1, no skew.
                let _ = log_skew_exponents;
            }
            NonlinearityLayout::Spline { log_widths, log_heights, derivative_logits, boundaries } => {
                for slot in &mut p[log_widths.clone()] {
                    *slot = 1.0;
                }
                for slot in &mut p[log_heights.clone()] {
                    *slot = 1.0;
                }
                for slot in &mut p[derivative_logits.clone()] {
                    *slot = UNIT_DERIVATIVE_LOGIT;
                }
                for corner in p[boundaries.clone()].chunks_exact_mut(4) {
                    corner.copy_from_slice(&[-1.0, 1.0, -1.0, 1.0]);
                }
            }
        }
        p
    }

    /// Place the mixture means at the per-dimension empirical quantiles
    /// of `data` (`n × dim`), evenly spaced in probability. Requires
    /// persistent parameters and the mixture nonlinearity.
    pub fn initialize_means_from_data(&mut self, data: &DMatrix<f64>) -> Result<()> {
        let dim = self.dimension;
        let k = self.layout.components;
        if data.ncols() != dim {
            return Err(Error::Shape(format!(
                "data has {} columns, layer dimension is {dim}",
                data.ncols()
            )));
        }
        let n = data.nrows();
        if n == 0 {
            return Err(Error::Shape("data must contain at least one row".into()));
        }
        let means = match &self.layout.nonlinearity {
            NonlinearityLayout::Mixture { means, .. } => means.clone(),
            NonlinearityLayout::Spline { .. } => {
                return Err(Error::Config(
                    "data-driven mean initialization requires the mixture nonlinearity".into(),
                ))
            }
        };
        let params = match &mut self.source {
            ParameterSource::Permanent(p) => p,
            ParameterSource::Amortized => {
                return Err(Error::Config(
                    "data-driven mean initialization requires persistent parameters".into(),
                ))
            }
        };
        let mut col = vec![0.0; n];
        for j in 0..dim {
            for (slot, &v) in col.iter_mut().zip(data.column(j).iter()) {
                *slot = v;
            }
            col.sort_by(f64::total_cmp);
            for comp in 0..k {
                let q = (comp as f64 + 1.0) / (k as f64 + 1.0);
                let pos = q * (n - 1) as f64;
                let lo = pos.floor() as usize;
                let frac = pos - lo as f64;
                let v = if lo + 1 < n {
                    col[lo] * (1.0 - frac) + col[lo + 1] * frac
                } else {
                    col[lo]
                };
                params[means.start + comp * dim + j] = v;
            }
        }
        Ok(())
    }

    fn validate_batch(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra: Option<&DMatrix<f64>>,
    ) -> Result<()> {
        if values.ncols() != self.dimension {
            return Err(Error::Shape(format!(
                "values have {} columns, layer dimension is {}",
                values.ncols(),
                self.dimension
            )));
        }
        if log_det.len() != values.nrows() {
            return Err(Error::Shape(format!(
                "log_det has length {}, batch has {} rows",
                log_det.len(),
                values.nrows()
            )));
        }
        match extra {
            Some(e) => {
                if e.nrows() != values.nrows() || e.ncols() != self.layout.total {
                    return Err(Error::Shape(format!(
                        "extra parameters are {}x{}, expected {}x{}",
                        e.nrows(),
                        e.ncols(),
                        values.nrows(),
                        self.layout.total
                    )));
                }
            }
            None => {
                if matches!(self.source, ParameterSource::Amortized) {
                    return Err(Error::Shape(
                        "amortized layer requires extra_params for every call".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn row_context(&self, raw: &[f64]) -> Result<RowContext> {
        let state = self.rotation.state(&raw[self.layout.rotation.clone()])?;
        let nonlin = match &self.engine {
            Engine::Mixture(resolver) => RowNonlinearity::Mixture(resolver.resolve(raw)),
            Engine::Spline => RowNonlinearity::Spline(self.splines_from(raw)),
        };
        Ok(RowContext { state, nonlin })
    }

    fn splines_from(&self, raw: &[f64]) -> Vec<SplineDim> {
        let k = self.layout.components;
        let (widths, heights, derivs, boxes) = match &self.layout.nonlinearity {
            NonlinearityLayout::Spline { log_widths, log_heights, derivative_logits, boundaries } => {
                (log_widths.start, log_heights.start, derivative_logits.start, boundaries.start)
            }
            NonlinearityLayout::Mixture { .. } => return Vec::new(),
        };
        (0..self.dimension)
            .map(|j| {
                let b = boxes + 4 * j;
                SplineDim::from_raw(
                    &raw[widths + j * k..widths + (j + 1) * k],
                    &raw[heights + j * k..heights + (j + 1) * k],
                    &raw[derivs + j * (k + 1)..derivs + (j + 1) * (k + 1)],
                    &[raw[b], raw[b + 1], raw[b + 2], raw[b + 3]],
                )
            })
            .collect()
    }

    /// Forward map of one already-rotated coordinate through the
    /// mixture nonlinearity: `(z, log |dz/dx|)`.
    fn mixture_forward_dim(&self, x: f64, m: &ResolvedMixture, j: usize) -> (f64, f64) {
        let k = self.layout.components;
        let (means, widths, weights, skews) = m.dim(j, k);
        let q = mixture_log_quantities(x, means, widths, weights, skews, &m.skew_signs, true);
        let z = self.inverse_normal.value(q.log_cdf, q.log_sf, &self.events);
        let log_pdf = q.log_pdf.unwrap_or(f64::NEG_INFINITY);
        let ld = self.inverse_normal.log_derivative(q.log_cdf, q.log_sf, log_pdf);
        (z, ld)
    }

    fn forward_row(&self, x: &DVector<f64>, ctx: &RowContext) -> (DVector<f64>, f64) {
        let rotated = ctx.state.apply_inverse(x);
        let mut out = DVector::zeros(self.dimension);
        let mut ld = 0.0;
        match &ctx.nonlin {
            RowNonlinearity::Mixture(m) => {
                for j in 0..self.dimension {
                    let (z, l) = self.mixture_forward_dim(rotated[j], m, j);
                    out[j] = z;
                    ld += l;
                }
            }
            RowNonlinearity::Spline(splines) => {
                for (j, spline) in splines.iter().enumerate() {
                    let (y, l) = spline.forward(rotated[j]);
                    out[j] = y;
                    ld += l;
                }
            }
        }
        (out, ld)
    }

    /// Inverse of one row. Returns the target-space values and the
    /// forward log-determinant at the recovered point, which the caller
    /// subtracts.
    fn inverse_row(&self, z: &DVector<f64>, ctx: &RowContext) -> (DVector<f64>, f64) {
        let mut u = DVector::zeros(self.dimension);
        let mut ld = 0.0;
        match &ctx.nonlin {
            RowNonlinearity::Mixture(m) => {
                let k = self.layout.components;
                for j in 0..self.dimension {
                    let (means, widths, weights, skews) = m.dim(j, k);
                    // Bisection needs only the value; Newton also needs
                    // the derivative, which costs the PDF pass.
                    let value = |x: f64| {
                        let q = mixture_log_quantities(
                            x,
                            means,
                            widths,
                            weights,
                            skews,
                            &m.skew_signs,
                            false,
                        );
                        self.inverse_normal.value(q.log_cdf, q.log_sf, &self.events)
                    };
                    let value_and_derivative = |x: f64| {
                        let (v, l) = self.mixture_forward_dim(x, m, j);
                        (v, exp_clamped(l))
                    };
                    let x =
                        invert_monotone(value, value_and_derivative, z[j], &self.options.solver);
                    u[j] = x;
                    ld += self.mixture_forward_dim(x, m, j).1;
                }
            }
            RowNonlinearity::Spline(splines) => {
                for (j, spline) in splines.iter().enumerate() {
                    let (x, l) = spline.inverse(z[j]);
                    u[j] = x;
                    ld += l;
                }
            }
        }
        (ctx.state.apply(&u), ld)
    }

    fn map_batch(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra: Option<&DMatrix<f64>>,
        direction: Direction,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        self.validate_batch(values, log_det, extra)?;
        let n = values.nrows();

        // Persistent parameters resolve once and broadcast; amortized
        // rows resolve inside the parallel loop.
        let shared = match (&self.source, extra) {
            (ParameterSource::Permanent(p), None) => Some(self.row_context(p)?),
            _ => None,
        };

        let rows: Vec<(DVector<f64>, f64)> = (0..n)
            .into_par_iter()
            .map(|i| -> Result<(DVector<f64>, f64)> {
                let x = DVector::from_iterator(self.dimension, values.row(i).iter().copied());
                let owned;
                let ctx = match (&shared, extra) {
                    (Some(c), None) => c,
                    (_, Some(e)) => {
                        let raw: Vec<f64> = e.row(i).iter().copied().collect();
                        owned = self.row_context(&raw)?;
                        &owned
                    }
                    (None, None) => {
                        return Err(Error::Shape(
                            "amortized layer requires extra_params for every call".into(),
                        ))
                    }
                };
                Ok(match direction {
                    Direction::Forward => self.forward_row(&x, ctx),
                    Direction::Inverse => self.inverse_row(&x, ctx),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let out = DMatrix::from_fn(n, self.dimension, |i, j| rows[i].0[j]);
        let sign = match direction {
            Direction::Forward => 1.0,
            Direction::Inverse => -1.0,
        };
        let log_det_out = DVector::from_fn(n, |i, _| log_det[i] + sign * rows[i].1);
        Ok((out, log_det_out))
    }
}

impl FlowTransform for GaussianizationLayer {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn param_count(&self) -> usize {
        self.layout.total
    }

    fn forward(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra_params: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        self.map_batch(values, log_det, extra_params, Direction::Forward)
    }

    fn inverse(
        &self,
        values: &DMatrix<f64>,
        log_det: &DVector<f64>,
        extra_params: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        self.map_batch(values, log_det, extra_params, Direction::Inverse)
    }
}

/// Log of the per-component kernel bandwidth `(4 √π / (π⁴ K))^{1/5}`.
fn init_log_width(components: usize) -> f64 {
    let pi = std::f64::consts::PI;
    0.2 * (4.0 * pi.sqrt() / (pi.powi(4) * components as f64)).ln()
}

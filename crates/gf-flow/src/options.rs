//! Configuration surface of the Gaussianization layer.

use crate::solver::SolverOptions;
use gf_core::{Error, Result};
use gf_prob::InverseCdfMode;
use serde::{Deserialize, Serialize};

/// Rotation parametrization applied before the per-dimension
/// nonlinearity. All modes are volume preserving (zero log-determinant
/// contribution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Product of elementary Householder reflections.
    Householder {
        /// Number of reflections; `None` defaults to the dimension.
        iterations: Option<usize>,
    },
    /// Unit-triangular × trace-free-diagonal × unit-triangular factors.
    Triangular,
    /// One Givens angle per unordered axis pair.
    Angles,
    /// 2×2 orthogonal matrix from a single Cayley parameter
    /// (dimension 2 only).
    Cayley,
    /// No rotation.
    NoRotation,
}

/// Which per-dimension nonlinearity the layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonlinearityKind {
    /// Mixture-of-skew-logistic CDF mapped through the inverse normal
    /// CDF; inverted numerically.
    SkewLogisticMixture,
    /// Monotonic rational-quadratic spline with linear tails;
    /// closed-form inverse.
    RationalQuadraticSpline,
}

/// Constructor options for [`crate::GaussianizationLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    /// Number of mixture components (or spline segments) per dimension.
    pub num_components: usize,
    /// Rotation parametrization.
    pub rotation: RotationMode,
    /// Which nonlinearity path to use.
    pub nonlinearity: NonlinearityKind,
    /// Inverse-normal-CDF approximation mode (mixture path only).
    pub inverse_cdf: InverseCdfMode,
    /// Lower bound for mixture kernel widths (normal space).
    pub width_min: f64,
    /// Upper bound for mixture kernel widths (normal space).
    pub width_max: f64,
    /// Use a softplus-with-floor width map instead of an exponential.
    pub softplus_for_width: bool,
    /// Saturate the width map smoothly at `width_max` (log-sum-exp
    /// bounded regulator) instead of growing without bound.
    pub width_smooth_saturation: bool,
    /// Hard-clip raw width parameters before the smooth map.
    pub clamp_widths: bool,
    /// Learn per-component mixture weights (otherwise uniform).
    pub fit_normalization: bool,
    /// Regulate learned weights into `[1, 100]` in normal space.
    pub regulate_normalization: bool,
    /// Learn per-component skew exponents with a fixed half-and-half
    /// sign split (otherwise plain logistic kernels).
    pub add_skewness: bool,
    /// Root-solver options for the mixture path's numeric inversion.
    pub solver: SolverOptions,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            num_components: 5,
            rotation: RotationMode::Householder { iterations: None },
            nonlinearity: NonlinearityKind::SkewLogisticMixture,
            inverse_cdf: InverseCdfMode::InormalPartlyPrecise,
            width_min: 0.01,
            width_max: 100.0,
            softplus_for_width: false,
            width_smooth_saturation: true,
            clamp_widths: false,
            fit_normalization: false,
            regulate_normalization: false,
            add_skewness: false,
            solver: SolverOptions::default(),
        }
    }
}

impl LayerOptions {
    /// Validate options against a target dimension. Fails fast with
    /// [`Error::Config`]; evaluation never re-checks these.
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(Error::Config("dimension must be >= 1".into()));
        }
        if self.num_components == 0 {
            return Err(Error::Config("num_components must be >= 1".into()));
        }
        if !self.width_min.is_finite() || self.width_min <= 0.0 {
            return Err(Error::Config(format!("width_min must be > 0, got {}", self.width_min)));
        }
        if self.width_smooth_saturation
            && (!self.width_max.is_finite() || self.width_max <= self.width_min)
        {
            return Err(Error::Config(format!(
                "smooth saturation requires width_max > width_min, got ({}, {})",
                self.width_min, self.width_max
            )));
        }
        if matches!(self.rotation, RotationMode::Cayley) && dimension != 2 {
            return Err(Error::Config(format!(
                "cayley rotation requires dimension 2, got {dimension}"
            )));
        }
        if self.regulate_normalization && !self.fit_normalization {
            return Err(Error::Config(
                "regulate_normalization requires fit_normalization".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        LayerOptions::default().validate(3).unwrap();
    }

    #[test]
    fn test_bad_width_bounds_rejected() {
        let opts = LayerOptions { width_min: 0.0, ..Default::default() };
        assert!(opts.validate(2).is_err());
        let opts = LayerOptions { width_max: 0.005, ..Default::default() };
        assert!(opts.validate(2).is_err());
    }

    #[test]
    fn test_cayley_dimension_restriction() {
        let opts = LayerOptions { rotation: RotationMode::Cayley, ..Default::default() };
        assert!(opts.validate(3).is_err());
        opts.validate(2).unwrap();
    }

    #[test]
    fn test_serde_round_trip() {
        let opts = LayerOptions {
            rotation: RotationMode::Angles,
            add_skewness: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        let back: LayerOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}

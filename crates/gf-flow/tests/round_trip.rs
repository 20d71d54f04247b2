//! End-to-end bijection checks across rotation modes, inverse-CDF
//! modes, and both nonlinearity paths.

use approx::assert_relative_eq;
use gf_core::FlowTransform;
use gf_flow::{GaussianizationLayer, LayerOptions, NonlinearityKind, RotationMode};
use gf_prob::InverseCdfMode;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn layer(dim: usize, options: LayerOptions, seed: u64) -> GaussianizationLayer {
    let mut rng = StdRng::seed_from_u64(seed);
    GaussianizationLayer::initialized(dim, options, &mut rng).unwrap()
}

fn batch(rows: &[&[f64]]) -> DMatrix<f64> {
    let dim = rows[0].len();
    DMatrix::from_fn(rows.len(), dim, |i, j| rows[i][j])
}

fn assert_round_trip(l: &GaussianizationLayer, x: &DMatrix<f64>, tol: f64, ld_tol: f64) {
    let ld = DVector::zeros(x.nrows());
    let (z, ld_fwd) = l.forward(x, &ld, None).unwrap();
    let (back, ld_rt) = l.inverse(&z, &ld_fwd, None).unwrap();
    for i in 0..x.nrows() {
        for j in 0..x.ncols() {
            assert_relative_eq!(back[(i, j)], x[(i, j)], epsilon = tol);
        }
        assert_relative_eq!(ld_rt[i], 0.0, epsilon = ld_tol);
    }
}

#[test]
fn round_trip_two_dim_householder_isigmoid() {
    let opts = LayerOptions {
        rotation: RotationMode::Householder { iterations: Some(2) },
        inverse_cdf: InverseCdfMode::Isigmoid,
        ..Default::default()
    };
    let l = layer(2, opts, 3);
    let x = batch(&[&[0.0, 0.0], &[1.5, -2.0]]);
    assert_round_trip(&l, &x, 1e-5, 1e-6);
}

#[test]
fn round_trip_all_rotation_modes() {
    let x = batch(&[&[0.3, -0.8], &[2.0, 1.1], &[-1.5, 0.0]]);
    for rotation in [
        RotationMode::Householder { iterations: None },
        RotationMode::Triangular,
        RotationMode::Angles,
        RotationMode::Cayley,
        RotationMode::NoRotation,
    ] {
        let l = layer(2, LayerOptions { rotation, ..Default::default() }, 17);
        assert_round_trip(&l, &x, 1e-5, 1e-6);
    }
}

#[test]
fn round_trip_all_inverse_cdf_modes() {
    let x = batch(&[&[0.0], &[-3.5], &[4.2], &[0.01]]);
    for inverse_cdf in [
        InverseCdfMode::Isigmoid,
        InverseCdfMode::InormalPartlyCrude,
        InverseCdfMode::InormalPartlyPrecise,
        InverseCdfMode::InormalFullPade,
    ] {
        let opts = LayerOptions {
            rotation: RotationMode::NoRotation,
            inverse_cdf,
            ..Default::default()
        };
        let l = layer(1, opts, 29);
        assert_round_trip(&l, &x, 1e-5, 1e-5);
    }
}

#[test]
fn round_trip_with_skewness_and_normalization() {
    let opts = LayerOptions {
        add_skewness: true,
        fit_normalization: true,
        regulate_normalization: true,
        ..Default::default()
    };
    let mut l = layer(3, opts, 41);
    // Push weights and skews off their neutral initialization.
    let mut params = l.parameters().unwrap().to_vec();
    for (i, p) in params.iter_mut().enumerate() {
        *p += 0.05 * ((i % 11) as f64 - 5.0);
    }
    l.set_parameters(params).unwrap();
    let x = batch(&[&[0.5, -0.5, 2.0], &[-2.2, 1.7, 0.0]]);
    assert_round_trip(&l, &x, 1e-5, 1e-5);
}

#[test]
fn round_trip_width_map_variants() {
    for (softplus_for_width, width_smooth_saturation, clamp_widths) in
        [(true, false, false), (false, false, false), (false, true, true)]
    {
        let opts = LayerOptions {
            softplus_for_width,
            width_smooth_saturation,
            clamp_widths,
            rotation: RotationMode::NoRotation,
            ..Default::default()
        };
        let l = layer(2, opts, 53);
        let x = batch(&[&[0.9, -1.4], &[-0.2, 2.6]]);
        assert_round_trip(&l, &x, 1e-5, 1e-6);
    }
}

#[test]
fn round_trip_spline_path() {
    let opts = LayerOptions {
        nonlinearity: NonlinearityKind::RationalQuadraticSpline,
        rotation: RotationMode::Householder { iterations: None },
        num_components: 8,
        ..Default::default()
    };
    let mut l = layer(3, opts, 61);
    let mut params = l.parameters().unwrap().to_vec();
    for (i, p) in params.iter_mut().enumerate() {
        *p += 0.15 * ((i % 5) as f64 - 2.0);
    }
    l.set_parameters(params).unwrap();
    // Points inside and far outside the spline boxes.
    let x = batch(&[&[0.1, -0.2, 0.4], &[6.0, -7.5, 0.0], &[-0.9, 0.9, 12.0]]);
    assert_round_trip(&l, &x, 1e-8, 1e-8);
}

#[test]
fn log_det_matches_numerical_jacobian() {
    let opts = LayerOptions {
        rotation: RotationMode::Angles,
        ..Default::default()
    };
    let l = layer(2, opts, 71);
    let x0 = [0.6, -1.1];
    let h = 1e-6;
    let eval = |x: &[f64]| {
        let (z, ld) = l
            .forward(&batch(&[x]), &DVector::zeros(1), None)
            .unwrap();
        ([z[(0, 0)], z[(0, 1)]], ld[0])
    };
    let (_, ld) = eval(&x0);
    let mut jac = DMatrix::zeros(2, 2);
    for j in 0..2 {
        let mut hi = x0;
        let mut lo = x0;
        hi[j] += h;
        lo[j] -= h;
        let (zh, _) = eval(&hi);
        let (zl, _) = eval(&lo);
        for i in 0..2 {
            jac[(i, j)] = (zh[i] - zl[i]) / (2.0 * h);
        }
    }
    assert_relative_eq!(ld, jac.determinant().abs().ln(), epsilon = 1e-4);
}

#[test]
fn forward_is_monotone_per_dimension_without_rotation() {
    let opts = LayerOptions {
        rotation: RotationMode::NoRotation,
        add_skewness: true,
        ..Default::default()
    };
    let l = layer(1, opts, 83);
    let n = 400;
    let x = DMatrix::from_fn(n, 1, |i, _| -10.0 + 20.0 * i as f64 / (n - 1) as f64);
    let (z, _) = l.forward(&x, &DVector::zeros(n), None).unwrap();
    for i in 1..n {
        assert!(z[(i, 0)] > z[(i - 1, 0)], "not increasing at row {i}");
    }
}

#[test]
fn extreme_latent_targets_stay_finite() {
    // Extreme latent targets deep in the Pade tails: the solver must
    // return finite points that forward maps back onto the targets.
    // No rotation, so the composite map is increasing and an ordering
    // check is meaningful (a 1-D Householder reflection would flip it).
    let opts = LayerOptions {
        rotation: RotationMode::NoRotation,
        ..Default::default()
    };
    let l = layer(1, opts, 97);
    let z = batch(&[&[-60.0], &[60.0]]);
    let (x, ld) = l.inverse(&z, &DVector::zeros(2), None).unwrap();
    assert!(x[(0, 0)].is_finite() && x[(1, 0)].is_finite());
    assert!(x[(0, 0)] < x[(1, 0)]);
    assert!(ld[0].is_finite() && ld[1].is_finite());
    let (z_back, _) = l.forward(&x, &DVector::zeros(2), None).unwrap();
    assert_relative_eq!(z_back[(0, 0)], -60.0, epsilon = 1e-6);
    assert_relative_eq!(z_back[(1, 0)], 60.0, epsilon = 1e-6);
}

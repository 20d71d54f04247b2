//! Mixture-of-skew-logistic log-CDF / log-SF / log-PDF quantities.
//!
//! One mixture lives on one dimension: `K` logistic kernels, each with a
//! mean, a (regulated, log-space) width, a log-weight, a (regulated)
//! skew exponent `e` and a fixed skew sign `s ∈ {+1, -1}`. For a
//! positively skewed component the CDF is `sigmoid(u)^e` with
//! `u = (x - mean)/width`; a negatively skewed component mirrors it.
//! All quantities are assembled from `softplus`/`log1mexp`/log-sum-exp
//! so that neither `log(0)` nor `exp(large)` appears at intermediate
//! steps; weights are normalized across components in log space.

use crate::math::{log1mexp, log_sigmoid, softplus, LogSumExp};

/// Log-space mixture quantities at a single scalar input.
#[derive(Debug, Clone, Copy)]
pub struct MixtureQuantities {
    /// `log F(x)` of the mixture CDF.
    pub log_cdf: f64,
    /// `log (1 - F(x))` of the mixture survival function.
    pub log_sf: f64,
    /// `log f(x)` of the mixture density, when requested.
    pub log_pdf: Option<f64>,
}

/// Evaluate the mixture log-CDF, log-SF and (optionally) log-PDF at `x`.
///
/// All slices have the same length `K >= 1`:
/// - `means`: component means,
/// - `log_widths`: regulated widths, log space,
/// - `log_weights`: unnormalized log mixture weights (zeros for a
///   uniform mixture); normalization happens here,
/// - `log_skew_exponents`: regulated skew exponents, log space (zeros
///   when skewness is off),
/// - `skew_signs`: `+1.0` or `-1.0` per component.
///
/// The PDF term costs one extra `softplus` per component and is skipped
/// by the bisection phase of the inverse solver, which only needs the
/// value.
pub fn mixture_log_quantities(
    x: f64,
    means: &[f64],
    log_widths: &[f64],
    log_weights: &[f64],
    log_skew_exponents: &[f64],
    skew_signs: &[f64],
    with_pdf: bool,
) -> MixtureQuantities {
    debug_assert!(!means.is_empty());
    debug_assert_eq!(means.len(), log_widths.len());
    debug_assert_eq!(means.len(), log_weights.len());
    debug_assert_eq!(means.len(), log_skew_exponents.len());
    debug_assert_eq!(means.len(), skew_signs.len());

    // log Σ_k w_k, for normalizing weights in log space.
    let mut weight_norm = LogSumExp::new();
    for &lw in log_weights {
        weight_norm.add(lw);
    }
    let log_weight_total = weight_norm.total();

    let mut cdf_acc = LogSumExp::new();
    let mut sf_acc = LogSumExp::new();
    let mut pdf_acc = LogSumExp::new();

    for k in 0..means.len() {
        let log_width = log_widths[k];
        let u = (x - means[k]) / log_width.exp();
        let log_norm = log_weights[k] - log_weight_total;
        let log_e = log_skew_exponents[k];
        let e = log_e.exp();
        let s = skew_signs[k];

        if with_pdf {
            let su = s * u;
            pdf_acc.add(-su - log_width + log_e - (e + 1.0) * softplus(-su) + log_norm);
        }

        // Sign-dependent closed forms; the selection depends on the
        // component's fixed sign, not on the data.
        let (log_cdf_k, log_sf_k) = if s > 0.0 {
            if log_e == 0.0 {
                // Plain logistic: CDF is sigmoid(u), SF is sigmoid(-u).
                (log_sigmoid(u), log_sigmoid(-u))
            } else {
                let t = -e * log_sigmoid(u);
                (-t, log1mexp(t))
            }
        } else {
            let t = -e * log_sigmoid(-u);
            (log1mexp(t), -t)
        };
        cdf_acc.add(log_cdf_k + log_norm);
        sf_acc.add(log_sf_k + log_norm);
    }

    MixtureQuantities {
        log_cdf: cdf_acc.total(),
        log_sf: sf_acc.total(),
        log_pdf: with_pdf.then(|| pdf_acc.total()),
    }
}

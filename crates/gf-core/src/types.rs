//! Shared types for GaussFlow.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for recoverable numeric-domain events.
///
/// Evaluation paths occasionally clamp a slightly negative square-root
/// argument to zero (floating-point imprecision in extreme CDF tails).
/// The correction is silent by design, but it signals parameters
/// drifting into a degenerate regime, so occurrences are counted here
/// and the first one per counter is reported via `log::warn!`.
#[derive(Debug, Default)]
pub struct NumericEvents {
    clamped_sqrt: AtomicU64,
}

impl NumericEvents {
    /// New counter with zero recorded events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a clamped square-root argument.
    pub fn record_clamped_sqrt(&self, argument: f64) {
        if self.clamped_sqrt.fetch_add(1, Ordering::Relaxed) == 0 {
            log::warn!(
                "clamped negative sqrt argument {argument:e} to 0; \
                 parameters may be drifting into a degenerate regime"
            );
        }
    }

    /// Number of clamped square-root arguments observed so far.
    pub fn clamped_sqrt_count(&self) -> u64 {
        self.clamped_sqrt.load(Ordering::Relaxed)
    }
}

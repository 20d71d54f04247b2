//! Error types for GaussFlow.

use thiserror::Error;

/// GaussFlow error type.
///
/// Both variants are unrecoverable and raised before any numeric work:
/// configuration errors at construction, shape errors at call entry.
/// Numeric edge cases inside evaluations (extreme CDF tails, the
/// `cdf ≈ 0.5` neighborhood) are handled by masked closed-form
/// substitutions and never surface as errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction-time options (bad bounds, unsupported
    /// mode/dimension combination).
    #[error("configuration error: {0}")]
    Config(String),

    /// Parameter-vector length mismatch, or a batch-size mismatch that
    /// cannot be resolved by broadcasting.
    #[error("shape error: {0}")]
    Shape(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

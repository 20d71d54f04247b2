//! # gf-core
//!
//! Core building blocks shared across GaussFlow crates:
//! - the crate-wide [`Error`]/[`Result`] types
//! - the [`FlowTransform`] trait implemented by flow layers
//! - small shared types (numeric-event counters)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::FlowTransform;
pub use types::NumericEvents;

//! Metrics definitions for parley.
//!
//! Crates record through the `metrics` crate facade; nothing is exported
//! until the embedding application installs a recorder.
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley_metrics::{counter, dispatch, labels};
//!
//! counter!(dispatch::REQUESTS_TOTAL, labels::PLATFORM => "console").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

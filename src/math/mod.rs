//! Numeric helpers shared by masking and averaging.

pub mod stats;

pub use stats::*;

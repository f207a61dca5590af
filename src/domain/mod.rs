//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - volumetric containers (`Volume`, `Mask`, `SignalMap`)
//! - keyword options for models (`ModelParams`, `ParamValue`)
//! - per-call options (`FitOptions`, `PredictOptions`, `ModelOptions`)

pub mod options;
pub mod params;
pub mod volume;

pub use options::*;
pub use params::*;
pub use volume::*;

//! `dmri-models` library crate.
//!
//! Selects and configures diffusion-MRI reconstruction models and runs their
//! fit/predict steps over 4D volumes, optionally split into voxel chunks that
//! are processed in parallel.
//!
//! - `gradients`: RAS+B gradient tables and their canonical form
//! - `fit`: the chunked execution engine
//! - `models`: model variants, the external backend interface and the factory
//!
//! The numerics of tensor, kurtosis, sparse-fascicle and shell-basis models
//! are supplied by an implementation of [`models::ReconstBackend`].

pub mod domain;
pub mod error;
pub mod fit;
pub mod gradients;
pub mod math;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{FitOptions, Mask, ModelOptions, ModelParams, PredictOptions, SignalMap, Volume};
pub use error::{BackendError, ErrorKind, ModelError};
pub use gradients::{GradientInput, GradientTable};
pub use models::{DiffusionModel, ModelFactory, ModelKind};

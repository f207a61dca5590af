//! Per-call options for model construction, fit and predict.

use crate::domain::{Mask, ModelParams, SignalMap};
use crate::error::ModelError;

/// Environment variable read by [`FitOptions::from_env`].
pub const N_JOBS_ENV: &str = "DMRI_N_JOBS";

/// Options that affect how a fit is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    /// Number of contiguous voxel chunks fitted in parallel. `0` and `1` both
    /// mean a single in-process fit.
    pub n_jobs: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self { n_jobs: 1 }
    }
}

impl FitOptions {
    pub fn with_jobs(n_jobs: usize) -> Self {
        Self { n_jobs }
    }

    /// Read `DMRI_N_JOBS` (a `.env` file is honoured). Missing means 1.
    pub fn from_env() -> Result<Self, ModelError> {
        dotenvy::dotenv().ok();
        match std::env::var(N_JOBS_ENV) {
            Ok(raw) => Self::parse_jobs(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    fn parse_jobs(raw: &str) -> Result<Self, ModelError> {
        let n_jobs = raw.trim().parse::<usize>().map_err(|_| {
            ModelError::config(format!("{N_JOBS_ENV} must be a non-negative integer, got '{raw}'."))
        })?;
        Ok(Self { n_jobs })
    }

    /// Effective worker count (at least 1).
    pub fn jobs(&self) -> usize {
        self.n_jobs.max(1)
    }
}

/// Options forwarded to predict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictOptions {
    /// Per-voxel baseline signal in fit-time voxel order. Overrides the
    /// baseline stored at construction.
    pub s0: Option<Vec<f64>>,
    /// Expected parallelism. When set it must equal the chunk count used by
    /// the fit.
    pub n_jobs: Option<usize>,
}

/// Inputs to model construction beyond the gradient table and model name.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    /// Baseline (b=0) signal map.
    pub s0: Option<SignalMap>,
    /// Explicit voxel mask; when absent and `s0` is given, one is derived.
    pub mask: Option<Mask>,
    /// Model-specific keyword options.
    pub params: ModelParams,
}

impl ModelOptions {
    pub fn with_s0(mut self, s0: SignalMap) -> Self {
        self.s0 = Some(s0);
        self
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }
}

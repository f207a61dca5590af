//! A gradient-independent model: the average diffusion-weighted signal.
//!
//! Fit:
//! 1. keep samples with `th_low <= b <= th_high`
//! 2. optionally regress out global intensity drift between samples
//! 3. reduce each voxel's kept samples with the median (or mean)
//!
//! Predict returns the stored map whatever gradient it is given.
//!
//! Drift correction uses whole-volume statistics, so it runs before the
//! voxels are chunked; step 3 is per voxel and goes through the
//! [`ChunkedEngine`]. Chunking therefore never changes the result.

use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{FitOptions, ModelParams, PredictOptions, SignalMap, Volume};
use crate::error::{BackendError, ModelError};
use crate::fit::ChunkedEngine;
use crate::gradients::{GradientInput, GradientTable};
use crate::math::{mean, median_mut, percentile};
use crate::models::backend::{ReconstFit, ReconstModel};
use crate::models::{DiffusionModel, ModelKind};

pub const DEFAULT_TH_LOW: f64 = 50.0;
pub const DEFAULT_TH_HIGH: f64 = 10000.0;

/// Sample medians below this are unreliable as drift references.
const MIN_CENTER: f64 = 1.0;

/// Percentile of the sample medians used as the common drift reference.
const DRIFT_REFERENCE_PERCENTILE: f64 = 75.0;

/// Per-voxel summary statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageStat {
    Median,
    Mean,
}

impl AverageStat {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_lowercase().as_str() {
            "median" => Ok(AverageStat::Median),
            "mean" => Ok(AverageStat::Mean),
            other => Err(ModelError::config(format!(
                "Unknown summary statistic '{other}' (expected 'median' or 'mean')."
            ))),
        }
    }

    fn reduce(self, values: &mut [f64]) -> f64 {
        let out = match self {
            AverageStat::Median => median_mut(values),
            AverageStat::Mean => mean(values),
        };
        out.unwrap_or(0.0)
    }
}

pub struct AverageDwModel {
    gradients: GradientTable,
    th_low: f64,
    th_high: f64,
    bias: bool,
    stat: AverageStat,
    average: Option<SignalMap>,
}

impl AverageDwModel {
    /// Options: `th_low`, `th_high`, `bias`, `stat`.
    pub fn new(gradients: GradientTable, params: &ModelParams) -> Result<Self, ModelError> {
        let th_low = params.f64_or("th_low", DEFAULT_TH_LOW)?;
        let th_high = params.f64_or("th_high", DEFAULT_TH_HIGH)?;
        if th_low > th_high {
            return Err(ModelError::config(format!(
                "th_low ({th_low}) must not exceed th_high ({th_high})."
            )));
        }
        Ok(Self {
            gradients,
            th_low,
            th_high,
            bias: params.bool_or("bias", true)?,
            stat: AverageStat::parse(params.str_or("stat", "median")?)?,
            average: None,
        })
    }

    pub fn stat(&self) -> AverageStat {
        self.stat
    }

    /// Indices of samples whose b-value lies in `[th_low, th_high]`.
    fn shell_selection(&self) -> Vec<usize> {
        self.gradients
            .bvals()
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b >= self.th_low && b <= self.th_high)
            .map(|(i, _)| i)
            .collect()
    }

    /// Multiplicative correction per selected sample.
    fn drift_factors(&self, volume: &Volume, selected: &[usize]) -> Vec<f64> {
        let n = volume.n_voxels();
        let mut centers: Vec<f64> = selected
            .iter()
            .map(|&g| {
                let mut column: Vec<f64> = (0..n).map(|v| volume.voxel(v)[g]).collect();
                median_mut(&mut column).unwrap_or(0.0)
            })
            .collect();

        let is_reliable = |c: f64| c.is_finite() && c >= MIN_CENTER;
        let reliable: Vec<f64> = centers.iter().copied().filter(|&c| is_reliable(c)).collect();
        let Some(reference) = percentile(&reliable, DRIFT_REFERENCE_PERCENTILE) else {
            warn!("no sample median >= {MIN_CENTER}; skipping drift correction");
            return vec![1.0; selected.len()];
        };

        // A NaN sample anywhere makes that sample's median NaN.
        for c in centers.iter_mut() {
            if !is_reliable(*c) {
                *c = reference;
            }
        }
        centers.iter().map(|c| reference / c).collect()
    }
}

impl DiffusionModel for AverageDwModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Average
    }

    fn fit(&mut self, volume: &Volume, opts: &FitOptions) -> Result<(), ModelError> {
        self.average = None;

        if self.gradients.len() != volume.samples() {
            return Err(ModelError::config(format!(
                "Gradient table has {} samples but the volume has {}.",
                self.gradients.len(),
                volume.samples()
            )));
        }

        let selected = self.shell_selection();
        if selected.is_empty() {
            return Err(ModelError::fit(
                None,
                format!("No samples with b-value in [{}, {}].", self.th_low, self.th_high),
            ));
        }

        let drift = if self.bias {
            self.drift_factors(volume, &selected)
        } else {
            vec![1.0; selected.len()]
        };

        let summary = VoxelSummary {
            selected,
            drift,
            stat: self.stat,
        };
        let mut engine = ChunkedEngine::new(Arc::new(summary));
        engine.fit(volume, None, opts.jobs())?;
        self.average = Some(engine.predict(&self.gradients, None, None)?);
        Ok(())
    }

    fn predict(
        &self,
        _gradients: GradientInput<'_>,
        _opts: &PredictOptions,
    ) -> Result<SignalMap, ModelError> {
        self.average
            .clone()
            .ok_or_else(|| ModelError::predict(None, "Average model has not been fitted."))
    }
}

/// Per-voxel reduction over drift-corrected samples.
struct VoxelSummary {
    selected: Vec<usize>,
    drift: Vec<f64>,
    stat: AverageStat,
}

struct VoxelSummaryFit {
    values: Vec<f64>,
}

impl ReconstModel for VoxelSummary {
    fn fit(&self, data: &DMatrix<f64>) -> Result<Box<dyn ReconstFit>, BackendError> {
        let mut scratch = vec![0.0; self.selected.len()];
        let values = data
            .row_iter()
            .map(|row| {
                for (slot, (&g, &d)) in scratch.iter_mut().zip(self.selected.iter().zip(&self.drift)) {
                    *slot = row[g] * d;
                }
                self.stat.reduce(&mut scratch)
            })
            .collect();
        Ok(Box::new(VoxelSummaryFit { values }))
    }
}

impl ReconstFit for VoxelSummaryFit {
    fn predict(
        &self,
        _gradients: &GradientTable,
        _s0: Option<&[f64]>,
    ) -> Result<DMatrix<f64>, BackendError> {
        Ok(DMatrix::from_column_slice(self.values.len(), 1, &self.values))
    }
}

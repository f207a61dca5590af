//! Canonical gradient table: unit b-vectors plus b-values.

use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use tracing::debug;

use crate::error::ModelError;

/// b-values at or below this are treated as non-diffusion-weighted.
pub const DEFAULT_B0_THRESHOLD: f64 = 50.0;

/// Tolerance on `|‖g‖ - 1|` for diffusion-weighted b-vectors.
const UNIT_ATOL: f64 = 1e-2;

#[derive(Debug, Clone, PartialEq)]
pub struct GradientTable {
    bvals: DVector<f64>,
    bvecs: Matrix3xX<f64>,
    b0_threshold: f64,
}

impl GradientTable {
    pub fn new(bvals: DVector<f64>, bvecs: Matrix3xX<f64>) -> Result<Self, ModelError> {
        Self::with_b0_threshold(bvals, bvecs, DEFAULT_B0_THRESHOLD)
    }

    pub fn with_b0_threshold(
        bvals: DVector<f64>,
        bvecs: Matrix3xX<f64>,
        b0_threshold: f64,
    ) -> Result<Self, ModelError> {
        let n = bvals.len();
        if n == 0 {
            return Err(ModelError::config("Gradient table is empty."));
        }
        if bvecs.ncols() != n {
            return Err(ModelError::config(format!(
                "Gradient table has {n} b-values but {} b-vectors.",
                bvecs.ncols()
            )));
        }
        if bvals.iter().chain(bvecs.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::config("Gradient table contains non-finite values."));
        }
        if bvals.iter().any(|&b| b < 0.0) {
            return Err(ModelError::config("Gradient table contains negative b-values."));
        }

        for (i, &b) in bvals.iter().enumerate() {
            if b <= b0_threshold {
                continue;
            }
            let norm = bvecs.column(i).norm();
            if (norm - 1.0).abs() > UNIT_ATOL {
                return Err(ModelError::config(format!(
                    "b-vector {i} (b={b}) is not unit length (norm {norm:.4})."
                )));
            }
        }

        // Single-direction prediction tables routinely have no b0.
        let min_b = bvals.iter().copied().fold(f64::INFINITY, f64::min);
        if min_b > b0_threshold {
            debug!(min_b, b0_threshold, "gradient table has no b0 samples");
        }

        Ok(Self {
            bvals,
            bvecs,
            b0_threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.bvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvals.is_empty()
    }

    pub fn bvals(&self) -> &DVector<f64> {
        &self.bvals
    }

    pub fn bvecs(&self) -> &Matrix3xX<f64> {
        &self.bvecs
    }

    pub fn bvec(&self, i: usize) -> Vector3<f64> {
        self.bvecs.column(i).into_owned()
    }

    pub fn b0_threshold(&self) -> f64 {
        self.b0_threshold
    }

    pub fn b0s_mask(&self) -> Vec<bool> {
        self.bvals.iter().map(|&b| b <= self.b0_threshold).collect()
    }

    /// Whether the table holds at least `n_bvals` distinct b magnitudes.
    ///
    /// b-values are rounded to `10^(trunc(log10(max b)) - 1)` before counting,
    /// so b=995 and b=1005 count as one shell. With `non_zero`, b0 samples are
    /// ignored.
    pub fn is_multi_shell(&self, n_bvals: usize, non_zero: bool) -> bool {
        let b0s = self.b0s_mask();
        let bvals: Vec<f64> = self
            .bvals
            .iter()
            .zip(&b0s)
            .filter(|&(_, &is_b0)| !(non_zero && is_b0))
            .map(|(&b, _)| b)
            .collect();
        unique_bval_magnitudes(&bvals).len() >= n_bvals
    }

    /// The RAS+B layout: a `4 x N` matrix of b-vector components and b-value.
    pub fn to_rasb(&self) -> DMatrix<f64> {
        let n = self.len();
        DMatrix::from_fn(4, n, |r, c| if r < 3 { self.bvecs[(r, c)] } else { self.bvals[c] })
    }
}

fn unique_bval_magnitudes(bvals: &[f64]) -> Vec<f64> {
    let max_b = bvals.iter().copied().fold(0.0_f64, f64::max);
    if bvals.is_empty() {
        return Vec::new();
    }
    if max_b <= 0.0 {
        return vec![0.0];
    }
    let magnitude = max_b.log10().trunc() - 1.0;
    let scale = 10f64.powf(magnitude);

    let mut rounded: Vec<f64> = bvals.iter().map(|b| (b / scale).round() * scale).collect();
    rounded.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    rounded.dedup();
    rounded
}

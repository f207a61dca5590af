//! Chunked fit/predict execution.
//!
//! Given:
//! - a 4D volume and an optional mask
//! - a worker count `n_jobs`
//!
//! the engine:
//! - selects the participating voxels as a `(voxels, samples)` matrix
//! - fits the whole matrix in-process (`n_jobs == 1`) or splits it into
//!   contiguous chunks and fits each chunk on a rayon pool
//! - remembers the spatial shape, mask and chunk count of that fit
//!
//! Predict runs one task per fitted chunk, concatenates the per-chunk
//! predictions in chunk order and scatters them back into the volume's
//! spatial shape (zero outside the mask).

use std::sync::Arc;

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{Dims, Mask, SignalMap, Volume};
use crate::error::{BackendError, ModelError};
use crate::fit::chunks::{chunk_bounds, concat_rows, split_rows};
use crate::gradients::GradientTable;
use crate::models::backend::{ReconstFit, ReconstModel};

enum Fitted {
    Single(Box<dyn ReconstFit>),
    Chunked(Vec<Box<dyn ReconstFit>>),
}

impl Fitted {
    fn chunk_count(&self) -> usize {
        match self {
            Fitted::Single(_) => 1,
            Fitted::Chunked(fits) => fits.len(),
        }
    }
}

/// State recorded by one fit and read by every later predict.
struct FitSession {
    fitted: Fitted,
    dims: Dims,
    mask: Option<Mask>,
    n_voxels: usize,
    /// Job count requested at fit time; may exceed the chunk count.
    n_jobs: usize,
}

/// Runs a [`ReconstModel`] over a volume, optionally in parallel chunks.
pub struct ChunkedEngine {
    model: Arc<dyn ReconstModel>,
    session: Option<FitSession>,
}

impl ChunkedEngine {
    pub fn new(model: Arc<dyn ReconstModel>) -> Self {
        Self {
            model,
            session: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.session.is_some()
    }

    /// Number of fitted chunks (1 for an unchunked fit), if fitted.
    pub fn chunk_count(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.fitted.chunk_count())
    }

    pub fn spatial_dims(&self) -> Option<Dims> {
        self.session.as_ref().map(|s| s.dims)
    }

    /// Fit the voxels of `volume` selected by `mask` (all voxels if `None`).
    ///
    /// Any previous fit is discarded first, so a failed fit leaves the engine
    /// unfitted rather than holding a partial chunk list.
    pub fn fit(
        &mut self,
        volume: &Volume,
        mask: Option<&Mask>,
        n_jobs: usize,
    ) -> Result<(), ModelError> {
        self.session = None;

        let data = volume.voxel_matrix(mask)?;
        let n_voxels = data.nrows();
        if n_voxels == 0 {
            return Err(ModelError::fit(None, "No voxels selected for fitting."));
        }

        let n_jobs = n_jobs.max(1);
        let fitted = if n_jobs == 1 {
            let fit = self
                .model
                .fit(&data)
                .map_err(|e| ModelError::fit(None, e.to_string()))?;
            Fitted::Single(fit)
        } else {
            let k = n_jobs.min(n_voxels);
            if k < n_jobs {
                debug!(n_jobs, n_voxels, chunks = k, "fewer voxels than jobs; clamping chunk count");
            }
            Fitted::Chunked(fit_chunks(self.model.as_ref(), &data, k)?)
        };

        self.session = Some(FitSession {
            fitted,
            dims: volume.dims(),
            mask: mask.cloned(),
            n_voxels,
            n_jobs,
        });
        Ok(())
    }

    /// Predict and reassemble into the fitted volume's spatial shape.
    ///
    /// `n_jobs`, when given, must match the job count the fit was run with.
    pub fn predict(
        &self,
        gradients: &GradientTable,
        s0: Option<&[f64]>,
        n_jobs: Option<usize>,
    ) -> Result<SignalMap, ModelError> {
        let values = self.predict_voxels(gradients, s0, n_jobs)?;
        let session = self.session()?;
        Ok(reassemble(session, &values))
    }

    /// Predict without spatial reassembly: one row per fitted voxel.
    pub fn predict_voxels(
        &self,
        gradients: &GradientTable,
        s0: Option<&[f64]>,
        n_jobs: Option<usize>,
    ) -> Result<DMatrix<f64>, ModelError> {
        let session = self.session()?;

        if let Some(requested) = n_jobs {
            if requested.max(1) != session.n_jobs {
                return Err(ModelError::predict(
                    None,
                    format!(
                        "Requested {requested} jobs but the model was fitted with {}.",
                        session.n_jobs
                    ),
                ));
            }
        }
        if let Some(s0) = s0 {
            if s0.len() != session.n_voxels {
                return Err(ModelError::predict(
                    None,
                    format!(
                        "Baseline signal has {} values but {} voxels were fitted.",
                        s0.len(),
                        session.n_voxels
                    ),
                ));
            }
        }

        let values = match &session.fitted {
            Fitted::Single(fit) => {
                let out = fit
                    .predict(gradients, s0)
                    .map_err(|e| ModelError::predict(None, e.to_string()))?;
                check_block(None, &out, session.n_voxels, None)?;
                out
            }
            Fitted::Chunked(fits) => predict_chunks(fits, gradients, s0, session.n_voxels)?,
        };

        if values.ncols() == 0 {
            return Err(ModelError::predict(None, "Model returned an empty prediction."));
        }
        Ok(values)
    }

    fn session(&self) -> Result<&FitSession, ModelError> {
        self.session
            .as_ref()
            .ok_or_else(|| ModelError::predict(None, "Model has not been fitted."))
    }
}

fn fit_chunks(
    model: &dyn ReconstModel,
    data: &DMatrix<f64>,
    k: usize,
) -> Result<Vec<Box<dyn ReconstFit>>, ModelError> {
    let blocks = split_rows(data, k);
    debug!(
        voxels = data.nrows(),
        chunks = k,
        sizes = ?blocks.iter().map(|b| b.nrows()).collect::<Vec<_>>(),
        "dispatching chunked fit"
    );

    let pool = build_pool(k).map_err(|e| ModelError::fit(None, e))?;
    let results: Vec<(usize, Result<Box<dyn ReconstFit>, BackendError>)> = pool.install(|| {
        blocks
            .par_iter()
            .enumerate()
            .map(|(i, block)| (i, model.fit(block)))
            .collect()
    });

    place_by_index(results, k).map_err(|(i, e)| ModelError::fit(Some(i), e.to_string()))
}

fn predict_chunks(
    fits: &[Box<dyn ReconstFit>],
    gradients: &GradientTable,
    s0: Option<&[f64]>,
    n_voxels: usize,
) -> Result<DMatrix<f64>, ModelError> {
    let k = fits.len();
    let bounds = chunk_bounds(n_voxels, k);
    let s0_chunks: Vec<Option<&[f64]>> = bounds
        .iter()
        .map(|r| s0.map(|s| &s[r.clone()]))
        .collect();

    let pool = build_pool(k).map_err(|e| ModelError::predict(None, e))?;
    let results: Vec<(usize, Result<DMatrix<f64>, BackendError>)> = pool.install(|| {
        fits.par_iter()
            .enumerate()
            .map(|(i, fit)| (i, fit.predict(gradients, s0_chunks[i])))
            .collect()
    });

    let blocks =
        place_by_index(results, k).map_err(|(i, e)| ModelError::predict(Some(i), e.to_string()))?;

    let channels = blocks.first().map(|b| b.ncols());
    for (i, block) in blocks.iter().enumerate() {
        check_block(Some(i), block, bounds[i].len(), channels)?;
    }
    Ok(concat_rows(&blocks))
}

/// Validate one predicted block against the voxels it was fitted on.
fn check_block(
    chunk: Option<usize>,
    block: &DMatrix<f64>,
    expected_rows: usize,
    expected_cols: Option<usize>,
) -> Result<(), ModelError> {
    if block.nrows() != expected_rows {
        return Err(ModelError::predict(
            chunk,
            format!(
                "Prediction has {} rows for {expected_rows} voxels.",
                block.nrows()
            ),
        ));
    }
    if let Some(cols) = expected_cols {
        if block.ncols() != cols {
            return Err(ModelError::predict(
                chunk,
                format!("Prediction has {} samples, other chunks have {cols}.", block.ncols()),
            ));
        }
    }
    Ok(())
}

/// Put index-tagged results into their slots, or report the lowest failing index.
fn place_by_index<T>(
    results: Vec<(usize, Result<T, BackendError>)>,
    k: usize,
) -> Result<Vec<T>, (usize, BackendError)> {
    let mut slots: Vec<Option<T>> = (0..k).map(|_| None).collect();
    let mut first_err: Option<(usize, BackendError)> = None;

    for (i, result) in results {
        match result {
            Ok(value) => slots[i] = Some(value),
            Err(e) => {
                if first_err.as_ref().is_none_or(|(j, _)| i < *j) {
                    first_err = Some((i, e));
                }
            }
        }
    }

    if let Some(err) = first_err {
        return Err(err);
    }
    Ok(slots.into_iter().flatten().collect())
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool, String> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| format!("Failed to start worker pool: {e}"))
}

/// Scatter per-voxel rows back into a zero-initialised spatial map.
fn reassemble(session: &FitSession, values: &DMatrix<f64>) -> SignalMap {
    let channels = values.ncols();
    let mut out = SignalMap::zeros(session.dims, channels);

    let targets: Box<dyn Iterator<Item = usize> + '_> = match &session.mask {
        Some(mask) => Box::new(mask.indices()),
        None => Box::new(0..session.n_voxels),
    };
    for (row, v) in targets.enumerate() {
        let dst = out.voxel_mut(v);
        for (c, slot) in dst.iter_mut().enumerate() {
            *slot = values[(row, c)];
        }
    }
    out
}

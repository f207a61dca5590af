//! Interface to the external reconstruction library.
//!
//! The numerics of tensor, kurtosis, sparse-fascicle and shell-basis models
//! live outside this crate. A [`ReconstBackend`] turns a [`DelegateSpec`]
//! into a [`ReconstModel`]; fitting that model on a block of voxels yields a
//! [`ReconstFit`] that can predict signals for any gradient table.
//!
//! These three traits are the only contract the chunked engine relies on.

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::domain::ModelParams;
use crate::error::BackendError;
use crate::gradients::GradientTable;
use crate::models::ModelKind;

/// Everything a backend needs to build one model.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateSpec {
    pub kind: ModelKind,
    pub gradients: GradientTable,
    /// Options already filtered to the keys this model family accepts.
    pub params: ModelParams,
}

pub trait ReconstBackend: Send + Sync {
    fn build(&self, spec: &DelegateSpec) -> Result<Arc<dyn ReconstModel>, BackendError>;
}

/// An unfitted model bound to its acquisition gradient table.
pub trait ReconstModel: Send + Sync {
    /// Fit `data`, one row per voxel and one column per gradient sample.
    fn fit(&self, data: &DMatrix<f64>) -> Result<Box<dyn ReconstFit>, BackendError>;
}

/// Fitted parameters for a block of voxels.
pub trait ReconstFit: Send + Sync {
    /// Predict the signal for `gradients`, one row per fitted voxel.
    ///
    /// `s0`, when given, holds one baseline value per fitted voxel.
    fn predict(
        &self,
        gradients: &GradientTable,
        s0: Option<&[f64]>,
    ) -> Result<DMatrix<f64>, BackendError>;
}

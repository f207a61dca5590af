//! Diffusion model capabilities.
//!
//! Every model exposes the same pair of operations, `fit` and `predict`,
//! through [`DiffusionModel`]. Callers hold a `Box<dyn DiffusionModel>` from
//! the [`factory`] and never look at the concrete variant.

use serde::{Deserialize, Serialize};

use crate::domain::{FitOptions, PredictOptions, SignalMap, Volume};
use crate::error::ModelError;
use crate::gradients::GradientInput;

pub mod average;
pub mod backend;
pub mod delegated;
pub mod factory;
pub mod trivial;

pub use average::*;
pub use backend::*;
pub use delegated::*;
pub use factory::*;
pub use trivial::*;

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Returns the baseline (b=0) map for any gradient.
    B0,
    /// Average of the diffusion-weighted samples.
    Average,
    /// Diffusion tensor.
    Dti,
    /// Diffusion kurtosis.
    Dki,
    /// Sparse fascicle model (elastic net or Gaussian-process solver).
    Sfm,
    /// 3D-SHORE basis expansion.
    Shore,
}

impl ModelKind {
    /// Parse a user-facing model name, ignoring case and surrounding blanks.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_lowercase();
        match token.as_str() {
            "s0" | "b0" => Some(ModelKind::B0),
            "avg" | "average" | "mean" => Some(ModelKind::Average),
            "dti" => Some(ModelKind::Dti),
            "dki" => Some(ModelKind::Dki),
            "sfm" | "gp" => Some(ModelKind::Sfm),
            t if t.starts_with("3dshore") => Some(ModelKind::Shore),
            _ => None,
        }
    }

    /// Human-readable label for logs.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::B0 => "b=0",
            ModelKind::Average => "average DWI",
            ModelKind::Dti => "DTI",
            ModelKind::Dki => "DKI",
            ModelKind::Sfm => "SFM",
            ModelKind::Shore => "3D-SHORE",
        }
    }
}

/// The fit/predict capability shared by all models.
pub trait DiffusionModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn fit(&mut self, volume: &Volume, opts: &FitOptions) -> Result<(), ModelError>;

    fn predict(
        &self,
        gradients: GradientInput<'_>,
        opts: &PredictOptions,
    ) -> Result<SignalMap, ModelError>;
}

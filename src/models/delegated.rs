//! Wrappers around models implemented by an external reconstruction backend.
//!
//! The wrapper owns everything the backend does not:
//! - baseline normalisation and default masking
//! - filtering keyword options down to what the model family accepts
//! - chunked fit/predict through the [`ChunkedEngine`]

use tracing::debug;

use crate::domain::{FitOptions, Mask, ModelParams, PredictOptions, SignalMap, Volume};
use crate::error::ModelError;
use crate::fit::ChunkedEngine;
use crate::gradients::{GradientInput, GradientTable};
use crate::math::finite_percentile;
use crate::models::backend::{DelegateSpec, ReconstBackend};
use crate::models::{DiffusionModel, ModelKind};

/// Normalised baselines are clipped to `[S0_FLOOR, 1.0]`.
pub const S0_FLOOR: f64 = 1e-5;

/// Without an explicit mask, voxels above this percentile of the normalised
/// baseline are fitted.
pub const MASK_PERCENTILE: f64 = 35.0;

pub const SFM_DEFAULT_SOLVER: &str = "ElasticNet";

const TENSOR_OPTIONS: &[&str] = &[
    "min_signal",
    "return_S0_hat",
    "fit_method",
    "weighting",
    "sigma",
    "jac",
];

const SFM_OPTIONS: &[&str] = &["solver", "isotropic"];

const SHORE_OPTIONS: &[&str] = &[
    "radial_order",
    "zeta",
    "tau",
    "lambdaN",
    "lambdaL",
    "constrain_e0",
    "positive_constraint",
];

/// Keyword options forwarded to the backend for `kind`, or `None` if `kind`
/// is not backed by the external library.
pub fn allowed_options(kind: ModelKind) -> Option<&'static [&'static str]> {
    match kind {
        ModelKind::Dti | ModelKind::Dki => Some(TENSOR_OPTIONS),
        ModelKind::Sfm => Some(SFM_OPTIONS),
        ModelKind::Shore => Some(SHORE_OPTIONS),
        ModelKind::B0 | ModelKind::Average => None,
    }
}

/// Divide by the maximum and clip to `[S0_FLOOR, 1.0]`.
pub fn normalize_s0(s0: &SignalMap) -> Result<Vec<f64>, ModelError> {
    if !s0.is_scalar() {
        return Err(ModelError::config("S0 must be a scalar map."));
    }
    let max = s0.max();
    if !(max.is_finite() && max > 0.0) {
        return Err(ModelError::config(format!(
            "S0 maximum must be finite and positive, got {max}."
        )));
    }
    Ok(s0
        .data()
        .iter()
        .map(|v| (v / max).clamp(S0_FLOOR, 1.0))
        .collect())
}

/// Resolve the fitting mask and the masked, normalised baseline.
///
/// An explicit mask wins; otherwise a baseline yields a percentile mask.
/// The returned baseline is in the mask's voxel order.
pub fn prepare_baseline(
    s0: Option<&SignalMap>,
    mask: Option<Mask>,
) -> Result<(Option<Mask>, Option<Vec<f64>>), ModelError> {
    let Some(s0) = s0 else {
        return Ok((mask, None));
    };
    let normalized = normalize_s0(s0)?;

    let mask = match mask {
        Some(mask) => {
            if mask.dims() != s0.dims() {
                return Err(ModelError::config(format!(
                    "Mask shape {:?} does not match S0 shape {:?}.",
                    mask.dims(),
                    s0.dims()
                )));
            }
            mask
        }
        None => {
            // Non-finite baselines never pass the threshold.
            let threshold =
                finite_percentile(&normalized, MASK_PERCENTILE).unwrap_or(f64::INFINITY);
            Mask::new(s0.dims(), normalized.iter().map(|&v| v > threshold).collect())?
        }
    };

    let masked: Vec<f64> = mask.indices().map(|v| normalized[v]).collect();
    Ok((Some(mask), Some(masked)))
}

pub struct DelegatedModel {
    kind: ModelKind,
    params: ModelParams,
    mask: Option<Mask>,
    s0: Option<Vec<f64>>,
    engine: ChunkedEngine,
}

impl DelegatedModel {
    pub fn new(
        kind: ModelKind,
        gradients: GradientTable,
        s0: Option<SignalMap>,
        mask: Option<Mask>,
        params: &ModelParams,
        backend: &dyn ReconstBackend,
    ) -> Result<Self, ModelError> {
        let allowed = allowed_options(kind).ok_or_else(|| {
            ModelError::config(format!(
                "{} is not provided by the reconstruction backend.",
                kind.display_name()
            ))
        })?;

        let (mask, s0) = prepare_baseline(s0.as_ref(), mask)?;

        let (mut params, dropped) = params.split_allowed(allowed);
        if !dropped.is_empty() {
            debug!(model = kind.display_name(), ?dropped, "ignoring unsupported options");
        }
        if kind == ModelKind::Sfm && !params.contains("solver") {
            params.insert("solver", SFM_DEFAULT_SOLVER);
        }

        let spec = DelegateSpec {
            kind,
            gradients,
            params,
        };
        let model = backend.build(&spec).map_err(|e| {
            ModelError::config(format!("Failed to build {} model: {e}", kind.display_name()))
        })?;

        Ok(Self {
            kind,
            params: spec.params,
            mask,
            s0,
            engine: ChunkedEngine::new(model),
        })
    }

    /// Options forwarded to the backend.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    /// Normalised baseline for the masked voxels.
    pub fn baseline(&self) -> Option<&[f64]> {
        self.s0.as_deref()
    }

    pub fn engine(&self) -> &ChunkedEngine {
        &self.engine
    }
}

impl DiffusionModel for DelegatedModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn fit(&mut self, volume: &Volume, opts: &FitOptions) -> Result<(), ModelError> {
        self.engine.fit(volume, self.mask.as_ref(), opts.jobs())
    }

    fn predict(
        &self,
        gradients: GradientInput<'_>,
        opts: &PredictOptions,
    ) -> Result<SignalMap, ModelError> {
        let gradients = GradientTable::from_input(gradients)?;
        let s0 = opts.s0.as_deref().or(self.s0.as_deref());
        self.engine.predict(&gradients, s0, opts.n_jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{RecordingBackend, gradient_table, rasb, synthetic_volume};

    fn s0_map() -> SignalMap {
        SignalMap::scalar([2, 2, 1], vec![0.0, 50.0, 100.0, 200.0]).unwrap()
    }

    #[test]
    fn baseline_is_normalised_and_clipped() {
        let n = normalize_s0(&s0_map()).unwrap();
        assert_eq!(n, vec![S0_FLOOR, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn baseline_must_have_a_positive_maximum() {
        let zero = SignalMap::scalar([1, 1, 2], vec![0.0, 0.0]).unwrap();
        assert_eq!(normalize_s0(&zero).unwrap_err().kind(), ErrorKind::Configuration);
        let vector = SignalMap::zeros([1, 1, 2], 3);
        assert!(normalize_s0(&vector).is_err());
    }

    #[test]
    fn default_mask_keeps_voxels_above_percentile() {
        let (mask, s0) = prepare_baseline(Some(&s0_map()), None).unwrap();
        // 35th percentile of [1e-5, .25, .5, 1] lies between .25 and .5.
        assert_eq!(mask.unwrap().as_slice(), &[false, false, true, true]);
        assert_eq!(s0.unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn nan_baseline_voxels_are_left_out_of_the_default_mask() {
        let s0 = SignalMap::scalar([2, 2, 1], vec![f64::NAN, 50.0, 100.0, 200.0]).unwrap();
        let (mask, baseline) = prepare_baseline(Some(&s0), None).unwrap();
        // Threshold is the 35th percentile of [.25, .5, 1] = 0.425.
        assert_eq!(mask.unwrap().as_slice(), &[false, false, true, true]);
        assert_eq!(baseline.unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn explicit_mask_wins_and_restricts_baseline() {
        let mask = Mask::new([2, 2, 1], vec![true, true, false, false]).unwrap();
        let (mask, s0) = prepare_baseline(Some(&s0_map()), Some(mask)).unwrap();
        assert_eq!(mask.unwrap().count(), 2);
        assert_eq!(s0.unwrap(), vec![S0_FLOOR, 0.25]);

        let wrong = Mask::full([4, 1, 1]);
        assert!(prepare_baseline(Some(&s0_map()), Some(wrong)).is_err());
    }

    #[test]
    fn options_are_filtered_per_family() {
        let backend = RecordingBackend::default();
        let params = ModelParams::new()
            .with("fit_method", "WLS")
            .with("radial_order", 6i64)
            .with("solver", "Lasso");
        let gtab = gradient_table(&[0.0, 1000.0, 1000.0]);

        let dti = DelegatedModel::new(ModelKind::Dti, gtab.clone(), None, None, &params, &backend)
            .unwrap();
        assert_eq!(dti.params().keys().collect::<Vec<_>>(), vec!["fit_method"]);

        let shore =
            DelegatedModel::new(ModelKind::Shore, gtab.clone(), None, None, &params, &backend)
                .unwrap();
        assert_eq!(shore.params().keys().collect::<Vec<_>>(), vec!["radial_order"]);

        let sfm = DelegatedModel::new(ModelKind::Sfm, gtab, None, None, &ModelParams::new(), &backend)
            .unwrap();
        assert_eq!(sfm.params().str_or("solver", "").unwrap(), SFM_DEFAULT_SOLVER);

        let specs = backend.specs();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].kind, ModelKind::Dti);
        assert_eq!(&specs[2].params, sfm.params());
    }

    #[test]
    fn non_delegated_kinds_are_rejected() {
        let backend = RecordingBackend::default();
        let gtab = gradient_table(&[1000.0]);
        let err = DelegatedModel::new(ModelKind::Average, gtab, None, None, &ModelParams::new(), &backend)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn fit_and_predict_use_the_derived_mask_and_baseline() {
        let backend = RecordingBackend::default();
        let vol = synthetic_volume([2, 2, 1], 3, 12);
        let gtab = gradient_table(&[0.0, 1000.0, 2000.0]);
        let mut model =
            DelegatedModel::new(ModelKind::Dki, gtab, Some(s0_map()), None, &ModelParams::new(), &backend)
                .unwrap();
        model.fit(&vol, &FitOptions::with_jobs(2)).unwrap();
        assert_eq!(model.engine().chunk_count(), Some(2));

        let g = [0.0, 0.0, 0.0, 0.0];
        let pred = model.predict((&g[..]).into(), &PredictOptions::default()).unwrap();
        assert_eq!(pred.shape(), vec![2, 2, 1]);
        assert_eq!(pred.voxel(0)[0], 0.0);
        assert_eq!(pred.voxel(1)[0], 0.0);

        // MeanSignalModel predicts s0 * mean at b=0.
        let mean = |v: usize| vol.voxel(v).iter().sum::<f64>() / 3.0;
        assert!((pred.voxel(2)[0] - 0.5 * mean(2)).abs() < 1e-9);
        assert!((pred.voxel(3)[0] - mean(3)).abs() < 1e-9);

        // An explicit baseline overrides the stored one.
        let opts = PredictOptions {
            s0: Some(vec![2.0, 2.0]),
            n_jobs: Some(2),
        };
        let pred = model.predict((&rasb(&[0.0])).into(), &opts).unwrap();
        assert!((pred.voxel(3)[0] - 2.0 * mean(3)).abs() < 1e-9);
    }
}

//! Model construction from a model name.
//!
//! Supported names (case-insensitive):
//!
//! | name                     | model                                   |
//! |--------------------------|-----------------------------------------|
//! | `s0`, `b0`               | [`TrivialB0Model`]                      |
//! | `avg`, `average`, `mean` | [`AverageDwModel`]                      |
//! | `3dshore*`               | 3D-SHORE via the backend                |
//! | `sfm`, `gp`              | sparse fascicle model via the backend   |
//! | `dti`, `dki`             | tensor / kurtosis via the backend       |

use std::sync::Arc;

use crate::domain::{ModelOptions, ModelParams};
use crate::error::ModelError;
use crate::gradients::{GradientInput, GradientTable};
use crate::models::backend::ReconstBackend;
use crate::models::{AverageDwModel, DelegatedModel, DiffusionModel, ModelKind, TrivialB0Model};

pub const SFM_GP_SOLVER: &str = "GaussianProcessRegressor";
pub const SFM_ISOTROPIC_MODEL: &str = "ExponentialIsotropicModel";

/// Builds [`DiffusionModel`]s, delegating numerical models to a backend.
#[derive(Clone)]
pub struct ModelFactory {
    backend: Arc<dyn ReconstBackend>,
}

impl ModelFactory {
    pub fn new(backend: Arc<dyn ReconstBackend>) -> Self {
        Self { backend }
    }

    /// Instantiate the model called `model` for the acquisition `gradients`.
    ///
    /// Caller options override the per-family defaults.
    pub fn init(
        &self,
        gradients: GradientInput<'_>,
        model: &str,
        options: ModelOptions,
    ) -> Result<Box<dyn DiffusionModel>, ModelError> {
        let kind = ModelKind::from_token(model)
            .ok_or_else(|| ModelError::UnsupportedModel(model.to_string()))?;

        match kind {
            ModelKind::B0 => return Ok(Box::new(TrivialB0Model::new(options.s0)?)),
            ModelKind::Average => {
                let gtab = GradientTable::from_input(gradients)?;
                return Ok(Box::new(AverageDwModel::new(gtab, &options.params)?));
            }
            _ => {}
        }

        let gtab = GradientTable::from_input(gradients)?;
        let mut params = default_params(kind, model, &gtab);
        params.merge(&options.params);

        let delegated = DelegatedModel::new(
            kind,
            gtab,
            options.s0,
            options.mask,
            &params,
            self.backend.as_ref(),
        )?;
        Ok(Box::new(delegated))
    }
}

/// Per-family defaults for backend-provided models.
fn default_params(kind: ModelKind, token: &str, gtab: &GradientTable) -> ModelParams {
    match kind {
        ModelKind::Shore => ModelParams::new()
            .with("radial_order", 6i64)
            .with("zeta", 700i64)
            .with("lambdaN", 1e-8)
            .with("lambdaL", 1e-8),
        ModelKind::Sfm => {
            let solver = if token.trim().eq_ignore_ascii_case("gp") {
                SFM_GP_SOLVER
            } else {
                crate::models::SFM_DEFAULT_SOLVER
            };
            let mut params = ModelParams::new().with("solver", solver);
            if gtab.is_multi_shell(2, false) {
                params.insert("isotropic", SFM_ISOTROPIC_MODEL);
            }
            params
        }
        _ => ModelParams::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitOptions, Mask, PredictOptions, SignalMap};
    use crate::error::ErrorKind;
    use crate::testing::{RecordingBackend, rasb, synthetic_volume};

    fn factory() -> (ModelFactory, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        (ModelFactory::new(backend.clone()), backend)
    }

    #[test]
    fn names_are_case_insensitive() {
        let (factory, backend) = factory();
        let g = rasb(&[0.0, 1000.0, 1000.0]);
        let a = factory.init((&g).into(), "dti", ModelOptions::default()).unwrap();
        let b = factory.init((&g).into(), "DTI", ModelOptions::default()).unwrap();
        assert_eq!(a.kind(), ModelKind::Dti);
        assert_eq!(a.kind(), b.kind());

        let specs = backend.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], specs[1]);
    }

    #[test]
    fn unknown_names_are_unsupported() {
        let (factory, backend) = factory();
        // Rejected before the (malformed) gradient is looked at.
        let g = [1.0, 2.0];
        let err = factory
            .init((&g[..]).into(), "bogus", ModelOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::UnsupportedModel(ref t) if t == "bogus"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(backend.specs().is_empty());
    }

    #[test]
    fn b0_model_requires_s0() {
        let (factory, _) = factory();
        let g = rasb(&[0.0]);
        let err = factory.init((&g).into(), "b0", ModelOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let s0 = SignalMap::scalar([1, 1, 2], vec![3.0, 4.0]).unwrap();
        let model = factory
            .init((&g).into(), "S0", ModelOptions::default().with_s0(s0.clone()))
            .unwrap();
        assert_eq!(model.kind(), ModelKind::B0);
        let pred = model.predict((&g).into(), &PredictOptions::default()).unwrap();
        assert_eq!(pred, s0);
    }

    #[test]
    fn average_model_reads_its_options() {
        let (factory, backend) = factory();
        let g = rasb(&[0.0, 1000.0, 1000.0]);
        let params = ModelParams::new().with("bias", false).with("stat", "mean");
        let mut model = factory
            .init((&g).into(), "Average", ModelOptions::default().with_params(params))
            .unwrap();
        assert_eq!(model.kind(), ModelKind::Average);
        assert!(backend.specs().is_empty());

        let vol = synthetic_volume([2, 2, 1], 3, 8);
        model.fit(&vol, &FitOptions::default()).unwrap();
        let pred = model.predict((&g).into(), &PredictOptions::default()).unwrap();
        let expected = (vol.voxel(0)[1] + vol.voxel(0)[2]) / 2.0;
        assert!((pred.voxel(0)[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn shore_defaults_can_be_overridden() {
        let (factory, backend) = factory();
        let g = rasb(&[0.0, 1000.0, 2000.0]);
        let opts = ModelOptions::default().with_params(ModelParams::new().with("zeta", 400i64));
        let model = factory.init((&g).into(), "3DShore", opts).unwrap();
        assert_eq!(model.kind(), ModelKind::Shore);

        let spec = &backend.specs()[0];
        assert_eq!(spec.params.f64_or("radial_order", 0.0).unwrap(), 6.0);
        assert_eq!(spec.params.f64_or("zeta", 0.0).unwrap(), 400.0);
        assert_eq!(spec.params.f64_or("lambdaN", 0.0).unwrap(), 1e-8);
        assert_eq!(spec.params.f64_or("lambdaL", 0.0).unwrap(), 1e-8);
    }

    #[test]
    fn gp_swaps_solver_and_adds_isotropic_term_on_multi_shell() {
        let (factory, backend) = factory();
        let single = rasb(&[1000.0, 1000.0, 1000.0]);
        let multi = rasb(&[0.0, 1000.0, 2000.0]);

        factory.init((&single).into(), "sfm", ModelOptions::default()).unwrap();
        factory.init((&multi).into(), "GP", ModelOptions::default()).unwrap();

        let specs = backend.specs();
        assert_eq!(specs[0].kind, ModelKind::Sfm);
        assert_eq!(specs[0].params.str_or("solver", "").unwrap(), "ElasticNet");
        assert!(!specs[0].params.contains("isotropic"));

        assert_eq!(specs[1].params.str_or("solver", "").unwrap(), SFM_GP_SOLVER);
        assert_eq!(
            specs[1].params.str_or("isotropic", "").unwrap(),
            SFM_ISOTROPIC_MODEL
        );
    }

    #[test]
    fn row_major_tables_reach_the_backend_transposed() {
        let (factory, backend) = factory();
        let columns = rasb(&[0.0, 1000.0, 2000.0, 3000.0, 1000.0]);
        let rows = columns.transpose();
        factory.init((&rows).into(), "dki", ModelOptions::default()).unwrap();
        assert_eq!(backend.specs()[0].gradients.to_rasb(), columns);
    }

    #[test]
    fn delegated_models_fit_and_predict_end_to_end() {
        let (factory, _) = factory();
        let g = rasb(&[0.0, 1000.0, 1000.0, 2000.0]);
        let vol = synthetic_volume([3, 3, 2], 4, 31);
        let mask = Mask::from_values([3, 3, 2], &(0..18).map(|v| (v % 2) as f64).collect::<Vec<_>>())
            .unwrap();
        let mut model = factory
            .init((&g).into(), "dti", ModelOptions::default().with_mask(mask))
            .unwrap();
        model.fit(&vol, &FitOptions::with_jobs(3)).unwrap();

        let target = [0.0, 0.0, 1.0, 1000.0];
        let pred = model.predict((&target[..]).into(), &PredictOptions::default()).unwrap();
        assert_eq!(pred.shape(), vec![3, 3, 2]);
        for v in 0..18 {
            if v % 2 == 0 {
                assert_eq!(pred.voxel(v)[0], 0.0);
            } else {
                assert!(pred.voxel(v)[0] > 0.0);
            }
        }
    }
}

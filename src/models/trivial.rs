//! A model that always predicts the baseline (b=0) map.

use crate::domain::{FitOptions, PredictOptions, SignalMap, Volume};
use crate::error::ModelError;
use crate::gradients::GradientInput;
use crate::models::{DiffusionModel, ModelKind};

#[derive(Debug, Clone)]
pub struct TrivialB0Model {
    s0: SignalMap,
}

impl TrivialB0Model {
    pub fn new(s0: Option<SignalMap>) -> Result<Self, ModelError> {
        let s0 = s0.ok_or_else(|| ModelError::config("S0 must be provided for the b=0 model."))?;
        Ok(Self { s0 })
    }
}

impl DiffusionModel for TrivialB0Model {
    fn kind(&self) -> ModelKind {
        ModelKind::B0
    }

    fn fit(&mut self, _volume: &Volume, _opts: &FitOptions) -> Result<(), ModelError> {
        Ok(())
    }

    fn predict(
        &self,
        _gradients: GradientInput<'_>,
        _opts: &PredictOptions,
    ) -> Result<SignalMap, ModelError> {
        Ok(self.s0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn requires_a_baseline() {
        let err = TrivialB0Model::new(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn predicts_the_baseline_for_any_gradient() {
        let s0 = SignalMap::scalar([2, 1, 1], vec![120.0, 80.0]).unwrap();
        let mut model = TrivialB0Model::new(Some(s0.clone())).unwrap();
        let vol = Volume::from_fn([2, 1, 1], 3, |_, _| 1.0);
        model.fit(&vol, &FitOptions::default()).unwrap();

        let g1 = [1.0, 0.0, 0.0, 1000.0];
        let g2 = [0.0, 0.0, 0.0, 0.0];
        let p1 = model.predict((&g1[..]).into(), &PredictOptions::default()).unwrap();
        let p2 = model.predict((&g2[..]).into(), &PredictOptions::default()).unwrap();
        assert_eq!(p1, s0);
        assert_eq!(p2, s0);
    }
}

//! Test doubles for the external reconstruction backend, synthetic data and
//! log capture.

use std::fmt;
use std::sync::{Arc, Mutex};

use nalgebra::{DMatrix, DVector, Matrix3xX};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::domain::{Dims, Volume};
use crate::error::BackendError;
use crate::gradients::GradientTable;
use crate::models::backend::{DelegateSpec, ReconstBackend, ReconstFit, ReconstModel};

/// Fits the per-voxel mean signal and predicts `s0 * mean * exp(-b / 1000)`.
///
/// Fitting fails on any non-finite input, which lets tests place a failure
/// in a chosen chunk.
#[derive(Debug, Default)]
pub struct MeanSignalModel;

struct MeanSignalFit {
    means: Vec<f64>,
}

impl ReconstModel for MeanSignalModel {
    fn fit(&self, data: &DMatrix<f64>) -> Result<Box<dyn ReconstFit>, BackendError> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(BackendError::new("non-finite signal"));
        }
        let means = data.row_iter().map(|row| row.mean()).collect();
        Ok(Box::new(MeanSignalFit { means }))
    }
}

impl ReconstFit for MeanSignalFit {
    fn predict(
        &self,
        gradients: &GradientTable,
        s0: Option<&[f64]>,
    ) -> Result<DMatrix<f64>, BackendError> {
        let bvals = gradients.bvals();
        Ok(DMatrix::from_fn(self.means.len(), gradients.len(), |v, j| {
            let base = s0.map_or(1.0, |s| s[v]);
            base * self.means[v] * (-bvals[j] / 1000.0).exp()
        }))
    }
}

/// Backend that records every spec it is asked to build.
#[derive(Default)]
pub struct RecordingBackend {
    pub built: Mutex<Vec<DelegateSpec>>,
}

impl RecordingBackend {
    pub fn specs(&self) -> Vec<DelegateSpec> {
        self.built.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl ReconstBackend for RecordingBackend {
    fn build(&self, spec: &DelegateSpec) -> Result<Arc<dyn ReconstModel>, BackendError> {
        if let Ok(mut built) = self.built.lock() {
            built.push(spec.clone());
        }
        Ok(Arc::new(MeanSignalModel))
    }
}

/// Unit b-vectors cycling through the axes, with the given b-values.
pub fn gradient_table(bvals: &[f64]) -> GradientTable {
    let bvecs = Matrix3xX::from_fn(bvals.len(), |r, c| if r == c % 3 { 1.0 } else { 0.0 });
    GradientTable::new(DVector::from_row_slice(bvals), bvecs).unwrap()
}

/// The RAS+B form of [`gradient_table`] as a `4 x N` matrix.
pub fn rasb(bvals: &[f64]) -> DMatrix<f64> {
    gradient_table(bvals).to_rasb()
}

/// Positive signal with a per-voxel level and Gaussian noise.
pub fn synthetic_volume(dims: Dims, samples: usize, seed: u64) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 5.0).unwrap();
    let n = dims[0] * dims[1] * dims[2];
    let levels: Vec<f64> = (0..n).map(|_| rng.gen_range(50.0..500.0)).collect();

    let mut data = Vec::with_capacity(n * samples);
    for level in &levels {
        for _ in 0..samples {
            let v: f64 = level + noise.sample(&mut rng);
            data.push(v.max(1.0));
        }
    }
    Volume::new(dims, samples, data).unwrap()
}

/// Records the level and message of every event it sees.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        if let Ok(mut events) = self.0.lock() {
            events.push((*event.metadata().level(), message));
        }
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub fn capture_events<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    let log = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    let events = log.0.lock().map(|e| e.clone()).unwrap_or_default();
    (out, events)
}

//! Volumetric containers: 4D diffusion volumes, 3D masks and signal maps.
//!
//! All containers share the same voxel order (C order, last spatial axis
//! fastest):
//!
//! ```text
//! voxel(x, y, z) = (x * ny + y) * nz + z
//! ```
//!
//! and keep per-voxel samples contiguous, so a volume flattened to
//! `(n_voxels, samples)` and a mask selection visit voxels in the same order.

use nalgebra::DMatrix;

use crate::error::ModelError;

/// Spatial extent `(nx, ny, nz)`.
pub type Dims = [usize; 3];

pub fn voxel_count(dims: Dims) -> usize {
    dims[0] * dims[1] * dims[2]
}

/// Linear voxel index of `(x, y, z)`.
pub fn voxel_index(dims: Dims, x: usize, y: usize, z: usize) -> usize {
    (x * dims[1] + y) * dims[2] + z
}

/// A 4D diffusion volume `(x, y, z, gradient-sample)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    dims: Dims,
    samples: usize,
    data: Vec<f64>,
}

impl Volume {
    pub fn new(dims: Dims, samples: usize, data: Vec<f64>) -> Result<Self, ModelError> {
        if samples == 0 {
            return Err(ModelError::config("Volume must carry at least one gradient sample."));
        }
        let expected = voxel_count(dims) * samples;
        if data.len() != expected {
            return Err(ModelError::config(format!(
                "Volume data length {} does not match shape {dims:?} x {samples} ({expected}).",
                data.len()
            )));
        }
        Ok(Self { dims, samples, data })
    }

    /// Build a volume from `f(voxel, sample)`.
    pub fn from_fn(dims: Dims, samples: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let n = voxel_count(dims);
        let mut data = Vec::with_capacity(n * samples);
        for v in 0..n {
            for g in 0..samples {
                data.push(f(v, g));
            }
        }
        Self { dims, samples, data }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn n_voxels(&self) -> usize {
        voxel_count(self.dims)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Signal of voxel `v` across all gradient samples.
    pub fn voxel(&self, v: usize) -> &[f64] {
        &self.data[v * self.samples..(v + 1) * self.samples]
    }

    /// Voxels participating in a fit as a `(voxels, samples)` matrix.
    ///
    /// With a mask, rows are the masked voxels in voxel order; without one,
    /// the spatial axes are flattened.
    pub fn voxel_matrix(&self, mask: Option<&Mask>) -> Result<DMatrix<f64>, ModelError> {
        let Some(mask) = mask else {
            return Ok(DMatrix::from_row_slice(self.n_voxels(), self.samples, &self.data));
        };
        if mask.dims() != self.dims {
            return Err(ModelError::config(format!(
                "Mask shape {:?} does not match volume shape {:?}.",
                mask.dims(),
                self.dims
            )));
        }

        let mut rows = Vec::with_capacity(mask.count() * self.samples);
        for v in mask.indices() {
            rows.extend_from_slice(self.voxel(v));
        }
        Ok(DMatrix::from_row_slice(mask.count(), self.samples, &rows))
    }
}

/// A 3D boolean voxel selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dims: Dims,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(dims: Dims, data: Vec<bool>) -> Result<Self, ModelError> {
        if data.len() != voxel_count(dims) {
            return Err(ModelError::config(format!(
                "Mask data length {} does not match shape {dims:?}.",
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Normalise a numeric (binary or probabilistic) mask: voxels `> 0` are kept.
    pub fn from_values(dims: Dims, values: &[f64]) -> Result<Self, ModelError> {
        Self::new(dims, values.iter().map(|&v| v > 0.0).collect())
    }

    /// A mask that keeps every voxel.
    pub fn full(dims: Dims) -> Self {
        Self {
            dims,
            data: vec![true; voxel_count(dims)],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    pub fn get(&self, v: usize) -> bool {
        self.data[v]
    }

    /// Number of selected voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// Selected voxel indices, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(v, &m)| if m { Some(v) } else { None })
    }
}

/// A spatial map with `channels` values per voxel.
///
/// Scalar maps (`channels == 1`) are used for baseline signals and for
/// scalar predictions; vector predictions carry one channel per predicted
/// gradient sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMap {
    dims: Dims,
    channels: usize,
    data: Vec<f64>,
}

impl SignalMap {
    pub fn new(dims: Dims, channels: usize, data: Vec<f64>) -> Result<Self, ModelError> {
        if channels == 0 {
            return Err(ModelError::config("Signal map must have at least one channel."));
        }
        if data.len() != voxel_count(dims) * channels {
            return Err(ModelError::config(format!(
                "Signal map data length {} does not match shape {dims:?} x {channels}.",
                data.len()
            )));
        }
        Ok(Self { dims, channels, data })
    }

    pub fn scalar(dims: Dims, data: Vec<f64>) -> Result<Self, ModelError> {
        Self::new(dims, 1, data)
    }

    pub fn zeros(dims: Dims, channels: usize) -> Self {
        Self {
            dims,
            channels,
            data: vec![0.0; voxel_count(dims) * channels],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_scalar(&self) -> bool {
        self.channels == 1
    }

    /// Shape as a list: `[nx, ny, nz]` for scalar maps, `[nx, ny, nz, c]` otherwise.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = self.dims.to_vec();
        if self.channels > 1 {
            shape.push(self.channels);
        }
        shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn voxel(&self, v: usize) -> &[f64] {
        &self.data[v * self.channels..(v + 1) * self.channels]
    }

    pub(crate) fn voxel_mut(&mut self, v: usize) -> &mut [f64] {
        &mut self.data[v * self.channels..(v + 1) * self.channels]
    }

    /// First channel at `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[voxel_index(self.dims, x, y, z) * self.channels]
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

//! Conversion of raw RAS+B arrays into [`GradientTable`]s.
//!
//! A RAS+B array stores, per gradient sample, the three b-vector components
//! followed by the b-value. Callers hand it over either as `4 x N` (one
//! column per sample) or `N x 4` (one row per sample); a single sample may
//! also be passed as a flat 4-vector.

use nalgebra::{DMatrix, DVector, Matrix3xX};
use tracing::warn;

use crate::error::ModelError;
use crate::gradients::GradientTable;

/// Any accepted gradient specification.
#[derive(Debug, Clone, Copy)]
pub enum GradientInput<'a> {
    /// A single sample `[x, y, z, b]`.
    Vector(&'a [f64]),
    /// A `4 x N` or `N x 4` RAS+B array.
    Matrix(&'a DMatrix<f64>),
    /// An already converted table.
    Table(&'a GradientTable),
}

impl<'a> From<&'a [f64]> for GradientInput<'a> {
    fn from(value: &'a [f64]) -> Self {
        GradientInput::Vector(value)
    }
}

impl<'a> From<&'a DMatrix<f64>> for GradientInput<'a> {
    fn from(value: &'a DMatrix<f64>) -> Self {
        GradientInput::Matrix(value)
    }
}

impl<'a> From<&'a GradientTable> for GradientInput<'a> {
    fn from(value: &'a GradientTable) -> Self {
        GradientInput::Table(value)
    }
}

/// How samples are laid out in a raw RAS+B array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// `4 x N`: one column per sample.
    Columns,
    /// `N x 4`: one row per sample.
    Rows,
    /// `4 x 4`: cannot be told apart; read as columns.
    Ambiguous,
}

pub fn detect_orientation(nrows: usize, ncols: usize) -> Result<Orientation, ModelError> {
    match (nrows, ncols) {
        (4, 4) => Ok(Orientation::Ambiguous),
        (4, _) => Ok(Orientation::Columns),
        (_, 4) => Ok(Orientation::Rows),
        _ => Err(ModelError::config(format!(
            "Gradient array of shape ({nrows}, {ncols}) has no axis of length 4."
        ))),
    }
}

impl GradientTable {
    pub fn from_input(input: GradientInput<'_>) -> Result<Self, ModelError> {
        match input {
            GradientInput::Vector(values) => {
                if values.len() != 4 {
                    return Err(ModelError::config(format!(
                        "Missing gradient information: expected 4 values, got {}.",
                        values.len()
                    )));
                }
                Self::from_rasb(&DMatrix::from_column_slice(4, 1, values))
            }
            GradientInput::Matrix(raw) => Self::from_rasb(raw),
            GradientInput::Table(table) => Ok(table.clone()),
        }
    }

    /// Convert a `4 x N` / `N x 4` RAS+B array.
    pub fn from_rasb(raw: &DMatrix<f64>) -> Result<Self, ModelError> {
        let columns = match detect_orientation(raw.nrows(), raw.ncols())? {
            Orientation::Columns => raw.clone(),
            Orientation::Rows => raw.transpose(),
            Orientation::Ambiguous => {
                warn!("4x4 gradient table: assuming one sample per column; make sure it is not transposed");
                raw.clone()
            }
        };

        let n = columns.ncols();
        let bvals = DVector::from_iterator(n, columns.row(3).iter().copied());
        let bvecs = Matrix3xX::from_fn(n, |r, c| columns[(r, c)]);
        Self::new(bvals, bvecs)
    }
}

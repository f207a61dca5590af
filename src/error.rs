//! Error taxonomy shared by the factory, the model variants and the engine.

use thiserror::Error;

/// Coarse classification of a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad inputs detected before any model work starts.
    Configuration,
    /// A fit (or one of its chunks) failed.
    Fit,
    /// A predict (or one of its chunks) failed, or predict was misused.
    Predict,
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported model <{0}>.")]
    UnsupportedModel(String),

    #[error("Model fit failed{}: {message}", chunk_suffix(.chunk))]
    Fit {
        chunk: Option<usize>,
        message: String,
    },

    #[error("Model predict failed{}: {message}", chunk_suffix(.chunk))]
    Predict {
        chunk: Option<usize>,
        message: String,
    },
}

impl ModelError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn fit(chunk: Option<usize>, message: impl Into<String>) -> Self {
        Self::Fit {
            chunk,
            message: message.into(),
        }
    }

    pub fn predict(chunk: Option<usize>, message: impl Into<String>) -> Self {
        Self::Predict {
            chunk,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Configuration(_) | ModelError::UnsupportedModel(_) => {
                ErrorKind::Configuration
            }
            ModelError::Fit { .. } => ErrorKind::Fit,
            ModelError::Predict { .. } => ErrorKind::Predict,
        }
    }

    /// Index of the failing chunk, when the failure is tied to one.
    pub fn chunk(&self) -> Option<usize> {
        match self {
            ModelError::Fit { chunk, .. } | ModelError::Predict { chunk, .. } => *chunk,
            _ => None,
        }
    }
}

/// Failure reported by an external reconstruction backend.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

fn chunk_suffix(chunk: &Option<usize>) -> String {
    match chunk {
        Some(i) => format!(" (chunk {i})"),
        None => String::new(),
    }
}

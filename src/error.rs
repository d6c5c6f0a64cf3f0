//! Error types shared across the crate.
use std::path::PathBuf;

use thiserror::Error;

/// Raised when a label is not part of the vocabulary an encoder was fitted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unknown label `{label}`")]
    UnknownLabel { label: String },
    #[error("unknown code {code}")]
    UnknownCode { code: usize },
}

/// How a caller should surface a [`PredictError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong.
    Client,
    /// The service is not ready yet; retrying later may succeed.
    Unavailable,
    /// Something unexpected failed inside the model.
    Internal,
}

/// Failures of the inference pipeline.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid {field}: {source}")]
    InvalidCategory {
        field: &'static str,
        #[source]
        source: EncodeError,
    },
    #[error("model artifacts are not loaded")]
    ServiceUnavailable,
    #[error("prediction failed: {reason}")]
    Prediction { reason: String },
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::InvalidCategory { .. } => ErrorKind::Client,
            PredictError::ServiceUnavailable => ErrorKind::Unavailable,
            PredictError::Prediction { .. } => ErrorKind::Internal,
        }
    }
}

/// Failures while simulating data or fitting models.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid distribution parameters: {0}")]
    Distribution(#[from] rand_distr::NormalError),
    #[error("dataset too small: {n} samples (need at least {min})")]
    TooFewSamples { n: usize, min: usize },
    #[error("test fraction must lie in (0, 1), got {0}")]
    InvalidTestFraction(f64),
    #[error("linear regression failed: {0}")]
    Linear(#[from] linfa_linear::LinearError<f64>),
    #[error("linear regression produced {got} coefficients, expected {expected}")]
    Coefficients { got: usize, expected: usize },
    #[error("label encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("invalid forest parameters: {0}")]
    Forest(String),
    #[error("invalid sample at row {row}: {reason}")]
    InvalidSample { row: usize, reason: String },
}

/// Failures while reading or writing the persisted artifact set.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid artifact: {0}")]
    Invalid(String),
}

/// Failures while reading or writing dataset CSV files.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing column `{0}` in header")]
    MissingColumn(&'static str),
}

/// A request field outside its accepted range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

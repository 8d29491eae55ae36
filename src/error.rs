//! Error types for the prediction pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Required input not found: {0}")]
    MissingInput(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed table {name}: {reason}")]
    MalformedTable { name: String, reason: String },

    #[error("Insufficient data for {ticker}: need at least {required} rows, got {actual}")]
    InsufficientData {
        ticker: String,
        required: usize,
        actual: usize,
    },

    #[error("Degenerate training data for {ticker}: {reason}")]
    Degenerate { ticker: String, reason: String },

    #[error("Singular system while fitting {0}")]
    SingularMatrix(&'static str),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Another run holds the lock at {0}")]
    Locked(PathBuf),

    #[error("Config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.into(),
            source,
        }
    }
}

impl From<::config::ConfigError> for PipelineError {
    fn from(e: ::config::ConfigError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

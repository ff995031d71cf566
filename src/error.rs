//! Error types for loading, scoring and reporting.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RfmError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{}: missing required column `{column}`", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{}:{line}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("no data: {0}")]
    EmptyInput(String),

    #[error("cannot form quartiles for {metric}: quantile edges {edges:?} are not strictly increasing")]
    DegenerateBins { metric: String, edges: Vec<f64> },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

pub type Result<T> = std::result::Result<T, RfmError>;

impl RfmError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RfmError::Io {
            path: path.into(),
            source,
        }
    }
}

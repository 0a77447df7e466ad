//! Error types for hyperparameter search

use hyperboost_features::FeatureError;
use hyperboost_gbdt::GbdtError;
use thiserror::Error;

/// Errors raised by the optimizer and its collaborators
#[derive(Error, Debug)]
pub enum TunerError {
    /// Invalid search space, budget or hyperparameter value; aborts a run
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Model training failed for one configuration
    #[error("training failure: {0}")]
    Training(String),

    /// Local artifact store could not be written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Experiment tracking sink rejected a run
    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("feature error: {0}")]
    Features(#[from] FeatureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<GbdtError> for TunerError {
    fn from(err: GbdtError) -> Self {
        match err {
            GbdtError::InvalidParams(msg) => TunerError::Configuration(msg),
            other => TunerError::Training(other.to_string()),
        }
    }
}

/// Result type for tuner operations
pub type Result<T> = std::result::Result<T, TunerError>;

//! Error types for feature preparation

use thiserror::Error;

/// Errors raised while reading, classifying, encoding or persisting data
#[derive(Error, Debug)]
pub enum FeatureError {
    /// A required column is missing or a column set is inconsistent
    #[error("schema error: {0}")]
    Schema(String),

    /// Transform-time columns differ from the columns the encoder was fit on
    #[error("schema mismatch: missing columns {missing:?}, unexpected columns {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// A cell could not be interpreted
    #[error("invalid value in column '{column}' at row {row}: {message}")]
    Parse {
        column: String,
        row: usize,
        message: String,
    },

    /// Persisted artifact written by an incompatible format
    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    /// Persisted artifact does not match its recorded digest
    #[error("hash mismatch for {path}: expected {expected}, found {found}")]
    HashMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Artifact content violates an invariant
    #[error("corrupt artifact: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for feature operations
pub type Result<T> = std::result::Result<T, FeatureError>;

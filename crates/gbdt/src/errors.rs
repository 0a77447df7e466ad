use thiserror::Error;

/// Errors returned by the boosted-tree learner.
#[derive(Debug, Error)]
pub enum GbdtError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("invalid label {value} at row {row}: expected 0 or 1")]
    InvalidLabel { row: usize, value: f64 },

    /// Model JSON that cannot be encoded, decoded or is structurally broken
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported model version: {0}")]
    UnsupportedVersion(u32),
}

pub type Result<T> = std::result::Result<T, GbdtError>;

//! hyperboost features - deterministic tabular feature preparation
//!
//! Column classification, fit-once/transform-many label encoding with
//! numeric scaling and crossed columns, the encoded training artifact, and
//! hash-checked canonical JSON persistence of fitted encoders.

pub mod artifact;
pub mod canon;
pub mod columns;
pub mod dataset;
pub mod encoder;
pub mod errors;
pub mod prepare;
pub mod store;

pub use artifact::TrainedDataset;
pub use columns::{
    classify, default_crossed_columns, ColumnSpec, CrossedColumn, TargetRule, CROSS_SEPARATOR,
    HIGH_INCOME_MARKER,
};
pub use dataset::{ColumnType, RawDataset, Value};
pub use encoder::{
    CategoryTable, FeatureTools, FittedEncoderState, Scaler, ScalerParams, TransformReport,
    ENCODER_FORMAT_VERSION,
};
pub use errors::FeatureError;
pub use prepare::{build_train, PrepareConfig, PreparedData};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

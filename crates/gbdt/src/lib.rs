//! hyperboost GBDT - deterministic gradient boosted trees
//!
//! Binary log-loss boosting with leaf-wise CART trees, L1/L2 regularised
//! leaves, seeded row/column sampling and stratified k-fold
//! cross-validation with early stopping.

mod binning;
pub mod cart;
pub mod cv;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod params;
pub mod trainer;
pub mod tree;

pub use cart::TreeConfig;
pub use cv::{cv, kfold_folds, stratified_folds, CvConfig, CvResult, Fold};
pub use dataset::Dataset;
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::GbdtError;
pub use metrics::{binary_logloss, sigmoid};
pub use model::{Booster, MODEL_VERSION};
pub use params::BoosterParams;
pub use trainer::{BoostingSession, GbdtTrainer};
pub use tree::{Node, Tree};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! hyperboost tuner - sequential hyperparameter search
//!
//! Proposes configurations from a [`SearchSpace`] with a pluggable
//! [`SearchStrategy`], scores them with a cross-validated [`Objective`],
//! refits the winner and records it in a local store and an experiment
//! tracking sink.

pub mod config;
pub mod errors;
pub mod evaluator;
pub mod optimizer;
pub mod pipeline;
pub mod space;
pub mod store;
pub mod strategy;
pub mod tracking;
pub mod trial;

pub use config::{StrategyConfig, TunerConfig};
pub use errors::TunerError;
pub use evaluator::{
    dataset_from_artifact, params_from_configuration, Evaluation, GbdtObjective, Objective,
    CV_FOLDS, EARLY_STOPPING_ROUNDS,
};
pub use optimizer::{BestResult, Optimizer, PersistenceOutcome, Phase, SinkStatus, METRIC_NAME};
pub use pipeline::{prepare_and_tune, tune};
pub use space::{default_search_space, Configuration, Param, ParamDomain, SearchSpace};
pub use store::{BestExperiment, LocalStore};
pub use strategy::{GridSearch, RandomSearch, SearchStrategy, TpeConfig, TpeStrategy};
pub use tracking::{ExperimentSink, FileTracker, RunRecord};
pub use trial::{best_trial, TrialRecord, TrialStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

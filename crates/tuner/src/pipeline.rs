//! End-to-end entry points wiring preparation, search and persistence

use hyperboost_features::{build_train, PrepareConfig, TrainedDataset};
use hyperboost_gbdt::Booster;
use tracing::{info, instrument};

use crate::config::TunerConfig;
use crate::errors::Result;
use crate::evaluator::GbdtObjective;
use crate::optimizer::{BestResult, Optimizer};
use crate::store::LocalStore;
use crate::tracking::FileTracker;

/// Tune a boosted-tree model on an encoded dataset
#[instrument(skip_all, fields(run_id = config.run_id, rows = dataset.rows()))]
pub fn tune(config: &TunerConfig, dataset: &TrainedDataset) -> Result<BestResult<Booster>> {
    config.validate()?;

    let objective = GbdtObjective::new(dataset)?;
    let mut optimizer = Optimizer::new(
        config.space.clone(),
        config.strategy.build(),
        objective,
        config.max_evaluations,
    )
    .with_run_id(config.run_id)
    .with_reuse_experiment(config.reuse_experiment);

    let store = LocalStore::new(&config.output_dir);
    let mut tracker = FileTracker::new(&config.tracking_dir);
    optimizer.optimize(&store, &mut tracker)
}

/// Prepare the training data, then tune on it
pub fn prepare_and_tune(prepare: &PrepareConfig, config: &TunerConfig) -> Result<BestResult<Booster>> {
    let prepared = build_train(prepare)?;
    info!(
        encoder = %prepared.encoder_path.display(),
        rows = prepared.dataset.rows(),
        "training data ready"
    );
    tune(config, &prepared.dataset)
}

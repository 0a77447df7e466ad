//! Objective evaluation
//!
//! [`GbdtObjective`] scores a configuration by stratified 3-fold
//! cross-validation with early stopping and remembers, per trial, how many
//! boosting rounds were actually used so the final model can be refit with
//! that count.

use std::collections::BTreeMap;

use hyperboost_features::TrainedDataset;
use hyperboost_gbdt::{cv, Booster, BoosterParams, CvConfig, Dataset, GbdtTrainer};
use serde::Serialize;
use tracing::{info, instrument};

use crate::errors::{Result, TunerError};
use crate::space::Configuration;

/// Early-stopping patience used during search
pub const EARLY_STOPPING_ROUNDS: usize = 20;

/// Folds used during search
pub const CV_FOLDS: usize = 3;

/// Score of one configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// Mean held-out binary log-loss at the best round
    pub loss: f64,
    /// Rounds up to and including the best round
    pub boosting_rounds: usize,
}

/// Expensive scoring routine driven by the optimizer
///
/// `evaluate` returns [`TunerError::Training`] for a failure the search may
/// skip over and [`TunerError::Configuration`] for one that must abort it.
pub trait Objective {
    type Model: Serialize;

    fn evaluate(&mut self, trial_id: usize, configuration: &Configuration) -> Result<Evaluation>;

    /// Train the final model on all data
    fn refit(&mut self, configuration: &Configuration) -> Result<Self::Model>;
}

/// Convert an encoded artifact into the learner's dataset
pub fn dataset_from_artifact(artifact: &TrainedDataset) -> Result<Dataset> {
    let labels = artifact.target().iter().map(|&y| f64::from(y)).collect();
    let dataset = Dataset::new(artifact.features().to_vec(), labels)?
        .with_feature_names(artifact.column_names().to_vec())?
        .with_categorical_features(artifact.categorical_indices())?;
    Ok(dataset)
}

/// Booster parameters for a configuration
///
/// Starts from `base` and overrides every named parameter. Integer-valued
/// parameters are rounded. Unknown names are a configuration error.
pub fn params_from_configuration(base: &BoosterParams, configuration: &Configuration) -> Result<BoosterParams> {
    let mut params = base.clone();
    for (name, &value) in configuration {
        match name.as_str() {
            "learning_rate" => params.learning_rate = value,
            "num_boost_round" => params.num_boost_round = as_count(name, value)?,
            "num_leaves" => params.num_leaves = as_count(name, value)?,
            "max_depth" => params.max_depth = Some(as_count(name, value)?),
            "min_data_in_leaf" => params.min_data_in_leaf = as_count(name, value)?,
            "max_bin" => params.max_bin = as_count(name, value)?,
            "min_child_weight" => params.min_child_weight = value,
            "colsample_bytree" => params.colsample_bytree = value,
            "subsample" => params.subsample = value,
            "reg_alpha" => params.reg_alpha = value,
            "reg_lambda" => params.reg_lambda = value,
            other => {
                return Err(TunerError::Configuration(format!(
                    "unknown hyperparameter '{}'",
                    other
                )))
            }
        }
    }
    params.validate()?;
    Ok(params)
}

fn as_count(name: &str, value: f64) -> Result<usize> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < 0.0 {
        return Err(TunerError::Configuration(format!(
            "'{}' must be a non-negative integer, got {}",
            name, value
        )));
    }
    Ok(rounded as usize)
}

/// Cross-validated boosted-tree objective over one encoded dataset
pub struct GbdtObjective {
    dataset: Dataset,
    base_params: BoosterParams,
    cv_config: CvConfig,
    rounds: BTreeMap<usize, usize>,
}

impl GbdtObjective {
    pub fn new(artifact: &TrainedDataset) -> Result<Self> {
        let base_params = BoosterParams {
            is_unbalance: true,
            seed: 1,
            ..BoosterParams::default()
        };
        let cv_config = CvConfig {
            nfold: CV_FOLDS,
            stratified: true,
            shuffle: true,
            early_stopping_rounds: Some(EARLY_STOPPING_ROUNDS),
            seed: base_params.seed,
        };
        Ok(Self {
            dataset: dataset_from_artifact(artifact)?,
            base_params,
            cv_config,
            rounds: BTreeMap::new(),
        })
    }

    pub fn with_cv_config(mut self, cv_config: CvConfig) -> Self {
        self.cv_config = cv_config;
        self
    }

    pub fn with_base_params(mut self, params: BoosterParams) -> Self {
        self.base_params = params;
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Boosting rounds the given trial settled on
    pub fn rounds_used(&self, trial_id: usize) -> Option<usize> {
        self.rounds.get(&trial_id).copied()
    }

    pub fn rounds(&self) -> &BTreeMap<usize, usize> {
        &self.rounds
    }
}

impl Objective for GbdtObjective {
    type Model = Booster;

    #[instrument(skip_all, fields(trial_id = trial_id))]
    fn evaluate(&mut self, trial_id: usize, configuration: &Configuration) -> Result<Evaluation> {
        let params = params_from_configuration(&self.base_params, configuration)?;
        let result = cv(&params, &self.dataset, &self.cv_config)?;

        let loss = result.final_loss();
        if !loss.is_finite() {
            return Err(TunerError::Training(format!(
                "cross-validation produced a non-finite loss ({})",
                loss
            )));
        }

        let boosting_rounds = result.rounds();
        self.rounds.insert(trial_id, boosting_rounds);
        info!(trial_id, loss, boosting_rounds, "trial evaluated");

        Ok(Evaluation {
            loss,
            boosting_rounds,
        })
    }

    fn refit(&mut self, configuration: &Configuration) -> Result<Booster> {
        let params = params_from_configuration(&self.base_params, configuration)?;
        let model = GbdtTrainer::new(params).train(&self.dataset)?;
        info!(trees = model.num_trees(), "final model trained");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> TrainedDataset {
        let mut features = Vec::new();
        let mut target = Vec::new();
        for i in 0..60 {
            let x = i as f64 / 60.0;
            let category = (i % 3) as f64;
            features.push(vec![x, category]);
            target.push(u8::from(x + if category == 1.0 { 0.3 } else { 0.0 } > 0.6));
        }
        TrainedDataset::new(
            features,
            target,
            vec!["x".into(), "group".into()],
            vec!["group".into()],
        )
        .unwrap()
    }

    fn config(rounds: f64) -> Configuration {
        [
            ("learning_rate", 0.1),
            ("num_boost_round", rounds),
            ("num_leaves", 31.0),
            ("min_child_weight", 0.1),
            ("colsample_bytree", 1.0),
            ("subsample", 1.0),
            ("reg_alpha", 0.01),
            ("reg_lambda", 0.01),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_params_from_configuration() {
        let base = BoosterParams::default();
        let params = params_from_configuration(&base, &config(70.0)).unwrap();
        assert_eq!(params.num_boost_round, 70);
        assert_eq!(params.num_leaves, 31);
        assert_eq!(params.reg_alpha, 0.01);
        assert_eq!(params.max_bin, base.max_bin);
    }

    #[test]
    fn test_unknown_parameter_is_configuration_error() {
        let mut bad = config(50.0);
        bad.insert("gamma".into(), 1.0);
        let err = params_from_configuration(&BoosterParams::default(), &bad).unwrap_err();
        assert!(matches!(err, TunerError::Configuration(_)));
    }

    #[test]
    fn test_invalid_value_is_configuration_error() {
        let mut bad = config(50.0);
        bad.insert("subsample".into(), 1.5);
        let err = params_from_configuration(&BoosterParams::default(), &bad).unwrap_err();
        assert!(matches!(err, TunerError::Configuration(_)));
    }

    #[test]
    fn test_artifact_conversion_keeps_categorical_columns() {
        let dataset = dataset_from_artifact(&artifact()).unwrap();
        assert_eq!(dataset.categorical_features, vec![1]);
        assert_eq!(dataset.feature_names, vec!["x", "group"]);
    }

    #[test]
    fn test_evaluate_records_rounds() {
        let mut objective = GbdtObjective::new(&artifact()).unwrap().with_base_params(BoosterParams {
            min_data_in_leaf: 3,
            is_unbalance: true,
            seed: 1,
            ..BoosterParams::default()
        });

        let evaluation = objective.evaluate(4, &config(50.0)).unwrap();
        assert!(evaluation.loss.is_finite());
        assert!(evaluation.boosting_rounds >= 1 && evaluation.boosting_rounds <= 50);
        assert_eq!(objective.rounds_used(4), Some(evaluation.boosting_rounds));
        assert_eq!(objective.rounds_used(5), None);
    }

    #[test]
    fn test_refit_uses_configured_rounds() {
        let mut objective = GbdtObjective::new(&artifact()).unwrap();
        let model = objective.refit(&config(12.0)).unwrap();
        assert_eq!(model.num_trees(), 12);
    }
}

//! Booster hyperparameters

use serde::{Deserialize, Serialize};

use crate::errors::{GbdtError, Result};

/// Parameters for one boosting run.
///
/// Names follow the LightGBM aliases used by the tuner's search space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub learning_rate: f64,
    /// Upper bound on boosting rounds; early stopping may use fewer
    pub num_boost_round: usize,
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub min_child_weight: f64,
    pub colsample_bytree: f64,
    pub subsample: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub max_bin: usize,
    /// Reweight positives by `n_neg / n_pos`
    pub is_unbalance: bool,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            num_boost_round: 100,
            num_leaves: 31,
            max_depth: None,
            min_data_in_leaf: 20,
            min_child_weight: 1e-3,
            colsample_bytree: 1.0,
            subsample: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 0.0,
            max_bin: 255,
            is_unbalance: false,
            seed: 0,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GbdtError::InvalidParams(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.num_boost_round == 0 {
            return Err(GbdtError::InvalidParams("num_boost_round must be at least 1".into()));
        }
        if self.num_leaves < 2 {
            return Err(GbdtError::InvalidParams(format!(
                "num_leaves must be at least 2, got {}",
                self.num_leaves
            )));
        }
        if self.max_bin < 2 {
            return Err(GbdtError::InvalidParams("max_bin must be at least 2".into()));
        }
        for (name, value) in [
            ("colsample_bytree", self.colsample_bytree),
            ("subsample", self.subsample),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(GbdtError::InvalidParams(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("min_child_weight", self.min_child_weight),
            ("reg_alpha", self.reg_alpha),
            ("reg_lambda", self.reg_lambda),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(GbdtError::InvalidParams(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

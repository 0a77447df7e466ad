//! Local artifact store for finished runs
//!
//! Each run writes `model_{run}.json`, `best_experiment_{run}.json` and the
//! trial audit log `trials_{run}.json` into one directory, all as
//! hash-checked canonical JSON.

use std::path::{Path, PathBuf};

use hyperboost_features::store::{read_artifact, write_artifact};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Result, TunerError};
use crate::space::Configuration;
use crate::trial::TrialRecord;

/// Winning configuration as persisted next to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestExperiment {
    pub run_id: u32,
    pub trial_id: usize,
    /// `num_boost_round` is the round count the trial actually used
    pub configuration: Configuration,
    pub loss: f64,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, run_id: u32) -> PathBuf {
        self.dir.join(format!("model_{}.json", run_id))
    }

    pub fn best_experiment_path(&self, run_id: u32) -> PathBuf {
        self.dir.join(format!("best_experiment_{}.json", run_id))
    }

    pub fn trials_path(&self, run_id: u32) -> PathBuf {
        self.dir.join(format!("trials_{}.json", run_id))
    }

    /// Write all artifacts of a run; returns the model path
    pub fn save_run<M: Serialize>(
        &self,
        best: &BestExperiment,
        model: &M,
        trials: &[TrialRecord],
    ) -> Result<PathBuf> {
        let model_path = self.model_path(best.run_id);
        write_artifact(&model_path, model).map_err(persistence)?;
        write_artifact(&self.best_experiment_path(best.run_id), best).map_err(persistence)?;
        write_artifact(&self.trials_path(best.run_id), &trials).map_err(persistence)?;

        info!(
            dir = %self.dir.display(),
            run_id = best.run_id,
            trials = trials.len(),
            "run artifacts saved"
        );
        Ok(model_path)
    }

    pub fn load_model<M: DeserializeOwned>(&self, run_id: u32) -> Result<M> {
        Ok(read_artifact(&self.model_path(run_id))?)
    }

    pub fn load_best_experiment(&self, run_id: u32) -> Result<BestExperiment> {
        Ok(read_artifact(&self.best_experiment_path(run_id))?)
    }

    pub fn load_trials(&self, run_id: u32) -> Result<Vec<TrialRecord>> {
        Ok(read_artifact(&self.trials_path(run_id))?)
    }
}

fn persistence(err: hyperboost_features::FeatureError) -> TunerError {
    TunerError::Persistence(err.to_string())
}

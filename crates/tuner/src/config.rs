//! Tuner configuration
//!
//! Loaded from TOML; every field has a default so a partial file works.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Result, TunerError};
use crate::space::{default_search_space, SearchSpace};
use crate::strategy::{GridSearch, RandomSearch, SearchStrategy, TpeConfig, TpeStrategy};

/// Which search strategy drives the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Tpe(TpeConfig),
    Random { seed: u64 },
    Grid { points_per_param: usize },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Tpe(TpeConfig::default())
    }
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn SearchStrategy> {
        match self {
            StrategyConfig::Tpe(config) => Box::new(TpeStrategy::new(config.clone())),
            StrategyConfig::Random { seed } => Box::new(RandomSearch::new(*seed)),
            StrategyConfig::Grid { points_per_param } => Box::new(GridSearch::new(*points_per_param)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Trials to run before refitting
    pub max_evaluations: usize,
    /// Suffix of the persisted artifact names
    pub run_id: u32,
    /// Log into the latest tracking experiment instead of a new one
    pub reuse_experiment: bool,
    pub output_dir: PathBuf,
    pub tracking_dir: PathBuf,
    pub strategy: StrategyConfig,
    pub space: SearchSpace,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 200,
            run_id: 0,
            reuse_experiment: false,
            output_dir: PathBuf::from("data/models"),
            tracking_dir: PathBuf::from("mlruns"),
            strategy: StrategyConfig::default(),
            space: default_search_space(),
        }
    }
}

impl TunerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "tuner configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_evaluations == 0 {
            return Err(TunerError::Configuration(
                "max_evaluations must be at least 1".into(),
            ));
        }
        if let StrategyConfig::Tpe(tpe) = &self.strategy {
            if !(tpe.gamma > 0.0 && tpe.gamma < 1.0) {
                return Err(TunerError::Configuration(format!(
                    "tpe gamma must be in (0, 1), got {}",
                    tpe.gamma
                )));
            }
            if !(tpe.prior_weight > 0.0) {
                return Err(TunerError::Configuration(
                    "tpe prior_weight must be positive".into(),
                ));
            }
        }
        self.space.validate()
    }
}

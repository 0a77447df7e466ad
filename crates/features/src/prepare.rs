//! Training data preparation
//!
//! Reads the training CSV, merges an optional incremental JSON-lines feed,
//! binarizes the income target, fits the encoders and persists them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::artifact::TrainedDataset;
use crate::columns::{classify, default_crossed_columns, CrossedColumn, TargetRule, HIGH_INCOME_MARKER};
use crate::dataset::{RawDataset, Value};
use crate::encoder::{FeatureTools, FittedEncoderState, Scaler};
use crate::errors::{FeatureError, Result};
use crate::store;

/// Preparation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    pub train_path: PathBuf,
    pub results_dir: PathBuf,
    pub processor_id: u32,
    /// JSON-lines records merged into `train_path` before fitting
    pub incremental_path: Option<PathBuf>,
    pub raw_target_column: String,
    pub target_column: String,
    pub target_marker: String,
    pub crossed: Vec<CrossedColumn>,
    pub scaler: Scaler,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/train/train.csv"),
            results_dir: PathBuf::from("data/dataprocessors"),
            processor_id: 0,
            incremental_path: None,
            raw_target_column: "income_bracket".to_string(),
            target_column: "income_label".to_string(),
            target_marker: HIGH_INCOME_MARKER.to_string(),
            crossed: default_crossed_columns(),
            scaler: Scaler::default(),
        }
    }
}

impl PrepareConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_column.is_empty() {
            return Err(FeatureError::Schema("target column name is empty".into()));
        }
        if self.target_marker.is_empty() {
            return Err(FeatureError::Schema("target marker is empty".into()));
        }
        if let Scaler::MinMax { low, high } = self.scaler {
            if !(low < high) {
                return Err(FeatureError::Schema(format!(
                    "min-max range [{}, {}] is empty",
                    low, high
                )));
            }
        }
        Ok(())
    }
}

/// Output of [`build_train`]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub encoder: FittedEncoderState,
    pub dataset: TrainedDataset,
    pub encoder_path: PathBuf,
}

/// Load, merge, fit and persist. Column order is saved for processor 0 only.
#[instrument(skip_all, fields(processor_id = config.processor_id))]
pub fn build_train(config: &PrepareConfig) -> Result<PreparedData> {
    config.validate()?;

    let mut raw = RawDataset::from_csv(&config.train_path)?;
    if let Some(incremental) = &config.incremental_path {
        raw.append_jsonl_file(incremental)?;
        raw.write_csv(&config.train_path)?;
    }

    let rule = TargetRule::new(config.target_marker.clone());
    derive_target(&mut raw, config, &rule)?;

    let spec = classify(&raw, &config.target_column, config.crossed.clone())?;
    let encoder = FeatureTools::new(config.scaler.clone())
        .with_target_rule(rule)
        .fit(&raw, &spec)?;
    let dataset = encoder.transform(&raw)?;

    let encoder_path = store::save_encoder(&config.results_dir, config.processor_id, &encoder)?;
    if config.processor_id == 0 {
        let order: Vec<String> = raw
            .columns()
            .iter()
            .filter(|name| **name != config.target_column)
            .cloned()
            .collect();
        store::save_column_order(&config.results_dir, &order)?;
    }

    info!(
        rows = dataset.rows(),
        cols = dataset.cols(),
        positives = dataset.target().iter().filter(|&&y| y == 1).count(),
        "training data prepared"
    );

    Ok(PreparedData {
        encoder,
        dataset,
        encoder_path,
    })
}

/// Replace the free-text raw target with a 0/1 column at the end of the table
fn derive_target(raw: &mut RawDataset, config: &PrepareConfig, rule: &TargetRule) -> Result<()> {
    if !raw.has_column(&config.raw_target_column) {
        if raw.has_column(&config.target_column) {
            return Ok(());
        }
        return Err(FeatureError::Schema(format!(
            "neither '{}' nor '{}' is present",
            config.raw_target_column, config.target_column
        )));
    }

    let labels = raw.drop_column(&config.raw_target_column)?;
    let binary = labels
        .iter()
        .enumerate()
        .map(|(row, value)| {
            rule.binarize(value, &config.raw_target_column, row)
                .map(|y| Value::Number(f64::from(y)))
        })
        .collect::<Result<Vec<_>>>()?;
    raw.push_column(&config.target_column, binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrepareConfig::default();
        assert_eq!(config.target_column, "income_label");
        assert_eq!(config.crossed.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PrepareConfig = serde_json::from_str(r#"{"processor_id": 2}"#).unwrap();
        assert_eq!(config.processor_id, 2);
        assert_eq!(config.raw_target_column, "income_bracket");
    }

    #[test]
    fn test_empty_scaler_range_rejected() {
        let config = PrepareConfig {
            scaler: Scaler::MinMax { low: 1.0, high: 1.0 },
            ..PrepareConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derive_target_replaces_raw_column() {
        let mut raw = RawDataset::new(
            vec!["age".into(), "income_bracket".into(), "sex".into()],
            vec![
                vec![Value::Number(30.0), Value::Text(">50K".into()), Value::Text("F".into())],
                vec![Value::Number(40.0), Value::Text("<=50K".into()), Value::Text("M".into())],
            ],
        )
        .unwrap();
        let config = PrepareConfig::default();

        derive_target(&mut raw, &config, &TargetRule::default()).unwrap();

        assert_eq!(raw.columns(), &["age", "sex", "income_label"]);
        assert_eq!(raw.rows()[0][2], Value::Number(1.0));
        assert_eq!(raw.rows()[1][2], Value::Number(0.0));
    }
}

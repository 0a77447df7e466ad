//! Encoded dataset handed to the optimizer

use serde::{Deserialize, Serialize};

use crate::errors::{FeatureError, Result};

/// Immutable encoded matrix with its target and column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedDataset {
    features: Vec<Vec<f64>>,
    target: Vec<u8>,
    column_names: Vec<String>,
    categorical_columns: Vec<String>,
}

impl TrainedDataset {
    pub fn new(
        features: Vec<Vec<f64>>,
        target: Vec<u8>,
        column_names: Vec<String>,
        categorical_columns: Vec<String>,
    ) -> Result<Self> {
        if features.len() != target.len() {
            return Err(FeatureError::Corrupt(format!(
                "{} feature rows but {} targets",
                features.len(),
                target.len()
            )));
        }
        if let Some((row, values)) = features
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != column_names.len())
        {
            return Err(FeatureError::Corrupt(format!(
                "row {} has {} values for {} columns",
                row,
                values.len(),
                column_names.len()
            )));
        }
        if let Some(bad) = target.iter().find(|&&y| y > 1) {
            return Err(FeatureError::Corrupt(format!("target value {} is not binary", bad)));
        }
        if let Some(unknown) = categorical_columns
            .iter()
            .find(|name| !column_names.contains(name))
        {
            return Err(FeatureError::Corrupt(format!(
                "categorical column '{}' is not a feature column",
                unknown
            )));
        }

        Ok(Self {
            features,
            target,
            column_names,
            categorical_columns,
        })
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    /// Positions of the categorical columns within `column_names`
    pub fn categorical_indices(&self) -> Vec<usize> {
        self.column_names
            .iter()
            .enumerate()
            .filter(|(_, name)| self.categorical_columns.contains(name))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn rows(&self) -> usize {
        self.features.len()
    }

    pub fn cols(&self) -> usize {
        self.column_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

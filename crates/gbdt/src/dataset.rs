//! In-memory training data for the learner
//!
//! Row-major `f64` features with binary labels. Categorical features hold
//! dense integer codes and are split one-vs-rest.

use crate::errors::{GbdtError, Result};

/// Training dataset with numeric features and 0/1 labels
#[derive(Clone, Debug)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub categorical_features: Vec<usize>,
}

impl Dataset {
    /// Build a dataset, checking row widths and that labels are binary
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        if features.is_empty() {
            return Err(GbdtError::EmptyDataset);
        }
        if features.len() != labels.len() {
            return Err(GbdtError::DimensionMismatch(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }

        let feature_count = features[0].len();
        for (row, values) in features.iter().enumerate() {
            if values.len() != feature_count {
                return Err(GbdtError::DimensionMismatch(format!(
                    "row {} has {} features, expected {}",
                    row,
                    values.len(),
                    feature_count
                )));
            }
        }
        for (row, &value) in labels.iter().enumerate() {
            if value != 0.0 && value != 1.0 {
                return Err(GbdtError::InvalidLabel { row, value });
            }
        }

        let feature_names = (0..feature_count).map(|i| format!("f{}", i)).collect();

        Ok(Self {
            features,
            labels,
            feature_count,
            feature_names,
            categorical_features: Vec::new(),
        })
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.feature_count {
            return Err(GbdtError::DimensionMismatch(format!(
                "{} feature names for {} features",
                names.len(),
                self.feature_count
            )));
        }
        self.feature_names = names;
        Ok(self)
    }

    pub fn with_categorical_features(mut self, mut indices: Vec<usize>) -> Result<Self> {
        indices.sort_unstable();
        indices.dedup();
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.feature_count) {
            return Err(GbdtError::DimensionMismatch(format!(
                "categorical feature {} out of range ({} features)",
                bad, self.feature_count
            )));
        }
        self.categorical_features = indices;
        Ok(self)
    }

    /// Rows selected by `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            feature_count: self.feature_count,
            feature_names: self.feature_names.clone(),
            categorical_features: self.categorical_features.clone(),
        }
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn is_categorical(&self, feature_idx: usize) -> bool {
        self.categorical_features.binary_search(&feature_idx).is_ok()
    }

    /// (negatives, positives)
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&y| y > 0.5).count();
        (self.labels.len() - positives, positives)
    }
}

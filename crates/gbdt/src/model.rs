//! Trained booster with versioned serialization

use serde::{Deserialize, Serialize};

use crate::errors::{GbdtError, Result};
use crate::metrics::sigmoid;
use crate::params::BoosterParams;
use crate::tree::Tree;

/// Current booster format version
pub const MODEL_VERSION: u32 = 1;

/// Binary classifier: sum of tree outputs plus base score, squashed by sigmoid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booster {
    /// Model format version
    pub version: u32,
    /// Initial raw score (log-odds)
    pub base_score: f64,
    pub trees: Vec<Tree>,
    pub feature_names: Vec<String>,
    pub categorical_features: Vec<usize>,
    pub params: BoosterParams,
}

impl Booster {
    /// Check format version and tree structure
    pub fn validate(&self) -> Result<()> {
        if self.version != MODEL_VERSION {
            return Err(GbdtError::UnsupportedVersion(self.version));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| GbdtError::Serialization(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw log-odds for one row
    pub fn predict_raw(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    /// Probability of the positive class for one row
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_raw(features))
    }

    pub fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GbdtError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let booster: Self =
            serde_json::from_str(json).map_err(|e| GbdtError::Serialization(e.to_string()))?;
        booster.validate()?;
        Ok(booster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn booster() -> Booster {
        Booster {
            version: MODEL_VERSION,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    Node {
                        feature_index: 0,
                        threshold: 0.5,
                        categorical: false,
                        left: 1,
                        right: 2,
                        value: None,
                    },
                    Node::leaf(-2.0),
                    Node::leaf(2.0),
                ],
            }],
            feature_names: vec!["x".into()],
            categorical_features: vec![],
            params: BoosterParams::default(),
        }
    }

    #[test]
    fn test_predictions() {
        let model = booster();
        assert_eq!(model.predict_raw(&[0.0]), -2.0);
        assert!(model.predict_proba(&[1.0]) > 0.8);
        assert_eq!(
            model.predict_proba_batch(&[vec![0.0], vec![1.0]]),
            vec![model.predict_proba(&[0.0]), model.predict_proba(&[1.0])]
        );
    }

    #[test]
    fn test_json_round_trip() {
        let model = booster();
        let json = model.to_json().unwrap();
        assert_eq!(Booster::from_json(&json).unwrap(), model);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut model = booster();
        model.version = 9;
        let json = serde_json::to_string(&model).unwrap();
        assert!(matches!(
            Booster::from_json(&json),
            Err(GbdtError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_corrupt_json_is_serialization_error() {
        let err = Booster::from_json("{\"version\": 1, \"trees\": [").unwrap_err();
        assert!(matches!(err, GbdtError::Serialization(_)));

        let mut model = booster();
        model.trees[0].nodes[0].left = 7;
        let json = serde_json::to_string(&model).unwrap();
        assert!(matches!(Booster::from_json(&json), Err(GbdtError::Serialization(_))));
    }
}

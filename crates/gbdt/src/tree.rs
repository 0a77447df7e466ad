//! Decision tree representation and evaluation

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Feature index to compare (for internal nodes)
    pub feature_index: u32,
    /// Numerical: go left when `value <= threshold`.
    /// Categorical: go left when `value == threshold`.
    pub threshold: f64,
    pub categorical: bool,
    /// Index of left child node
    pub left: u32,
    /// Index of right child node
    pub right: u32,
    /// Leaf value (None for internal nodes, Some for leaves), already shrunk
    pub value: Option<f64>,
}

impl Node {
    pub fn leaf(value: f64) -> Self {
        Self {
            feature_index: 0,
            threshold: 0.0,
            categorical: false,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }

    fn goes_left(&self, feature_value: f64) -> bool {
        if self.categorical {
            feature_value == self.threshold
        } else {
            feature_value <= self.threshold
        }
    }
}

/// A single decision tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Evaluate the tree on one feature vector
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if let Some(value) = node.value {
                return value;
            }

            let feature_value = features
                .get(node.feature_index as usize)
                .copied()
                .unwrap_or(f64::NAN);

            idx = if node.goes_left(feature_value) {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.value.is_some()).count()
    }

    /// Child indices must point forward and stay in bounds
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.value.is_some() {
                continue;
            }
            for child in [node.left as usize, node.right as usize] {
                if child <= i || child >= self.nodes.len() {
                    return Err(format!("node {} has invalid child {}", i, child));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(categorical: bool) -> Tree {
        Tree {
            nodes: vec![
                Node {
                    feature_index: 1,
                    threshold: 2.0,
                    categorical,
                    left: 1,
                    right: 2,
                    value: None,
                },
                Node::leaf(-1.0),
                Node::leaf(1.0),
            ],
        }
    }

    #[test]
    fn test_numerical_split() {
        let tree = stump(false);
        assert_eq!(tree.predict(&[0.0, 1.0]), -1.0);
        assert_eq!(tree.predict(&[0.0, 2.0]), -1.0);
        assert_eq!(tree.predict(&[0.0, 3.0]), 1.0);
        assert_eq!(tree.num_leaves(), 2);
    }

    #[test]
    fn test_categorical_split() {
        let tree = stump(true);
        assert_eq!(tree.predict(&[0.0, 2.0]), -1.0);
        assert_eq!(tree.predict(&[0.0, 1.0]), 1.0);
        assert_eq!(tree.predict(&[0.0, 3.0]), 1.0);
    }

    #[test]
    fn test_validate_catches_backward_edges() {
        let mut tree = stump(false);
        assert!(tree.validate().is_ok());
        tree.nodes[0].right = 0;
        assert!(tree.validate().is_err());
    }
}

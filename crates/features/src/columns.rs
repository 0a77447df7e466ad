//! Column classification
//!
//! Splits a raw dataset's columns into numerical, categorical and target,
//! and carries the externally configured crossed-column pairs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{ColumnType, RawDataset, Value};
use crate::errors::{FeatureError, Result};

/// Joins the two parent tokens of a crossed value
pub const CROSS_SEPARATOR: char = '\u{1f}';

/// Substring that marks the positive class in raw income labels
pub const HIGH_INCOME_MARKER: &str = ">50K";

/// Synthetic categorical feature built from two categorical parents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossedColumn {
    pub left: String,
    pub right: String,
}

impl CrossedColumn {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Output column name, e.g. `education-occupation`
    pub fn name(&self) -> String {
        format!("{}-{}", self.left, self.right)
    }

    /// Category token for one row
    pub fn combine(&self, left_token: &str, right_token: &str) -> String {
        let mut token = String::with_capacity(left_token.len() + right_token.len() + 1);
        token.push_str(left_token);
        token.push(CROSS_SEPARATOR);
        token.push_str(right_token);
        token
    }
}

/// Crossed pairs used for the census income data
pub fn default_crossed_columns() -> Vec<CrossedColumn> {
    vec![
        CrossedColumn::new("education", "occupation"),
        CrossedColumn::new("native_country", "occupation"),
    ]
}

/// Binarization of the raw target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRule {
    /// Labels containing this substring are positive
    pub positive_marker: String,
}

impl Default for TargetRule {
    fn default() -> Self {
        Self {
            positive_marker: HIGH_INCOME_MARKER.to_string(),
        }
    }
}

impl TargetRule {
    pub fn new(positive_marker: impl Into<String>) -> Self {
        Self {
            positive_marker: positive_marker.into(),
        }
    }

    /// Free-text label to {0, 1}
    pub fn binarize_label(&self, label: &str) -> u8 {
        u8::from(label.contains(&self.positive_marker))
    }

    /// Text labels go through the marker rule; numbers must already be 0 or 1
    pub fn binarize(&self, value: &Value, column: &str, row: usize) -> Result<u8> {
        match value {
            Value::Text(label) => Ok(self.binarize_label(label)),
            Value::Number(n) if *n == 0.0 => Ok(0),
            Value::Number(n) if *n == 1.0 => Ok(1),
            Value::Number(n) => Err(FeatureError::Parse {
                column: column.to_string(),
                row,
                message: format!("target value {} is not 0 or 1", n),
            }),
            Value::Missing => Err(FeatureError::Parse {
                column: column.to_string(),
                row,
                message: "target value is missing".into(),
            }),
        }
    }
}

/// Partition of a dataset's columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
    pub target: String,
    pub crossed: Vec<CrossedColumn>,
}

impl ColumnSpec {
    /// Check the partition invariants
    pub fn validate(&self) -> Result<()> {
        let numerical: BTreeSet<&str> = self.numerical.iter().map(String::as_str).collect();
        let categorical: BTreeSet<&str> = self.categorical.iter().map(String::as_str).collect();

        if numerical.len() != self.numerical.len() || categorical.len() != self.categorical.len() {
            return Err(FeatureError::Schema("duplicate column in spec".into()));
        }
        if let Some(shared) = numerical.intersection(&categorical).next() {
            return Err(FeatureError::Schema(format!(
                "column '{}' is both numerical and categorical",
                shared
            )));
        }
        if numerical.contains(self.target.as_str()) || categorical.contains(self.target.as_str()) {
            return Err(FeatureError::Schema(format!(
                "target '{}' is also a feature",
                self.target
            )));
        }
        for cross in &self.crossed {
            for parent in [&cross.left, &cross.right] {
                if !categorical.contains(parent.as_str()) {
                    return Err(FeatureError::Schema(format!(
                        "crossed column '{}' references non-categorical column '{}'",
                        cross.name(),
                        parent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Raw columns a dataset must carry to be encoded
    pub fn feature_inputs(&self) -> impl Iterator<Item = &str> {
        self.numerical
            .iter()
            .chain(&self.categorical)
            .map(String::as_str)
    }

    /// Encoded column names: numerical, categorical, then crossed
    pub fn output_columns(&self) -> Vec<String> {
        self.numerical
            .iter()
            .chain(&self.categorical)
            .cloned()
            .chain(self.crossed.iter().map(CrossedColumn::name))
            .collect()
    }

    /// Categorical and crossed output names
    pub fn categorical_outputs(&self) -> Vec<String> {
        self.categorical
            .iter()
            .cloned()
            .chain(self.crossed.iter().map(CrossedColumn::name))
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        self.numerical.len() + self.categorical.len() + self.crossed.len()
    }
}

/// Text columns become categorical, everything else except the target is
/// numerical. Column order follows the dataset.
pub fn classify(dataset: &RawDataset, target: &str, crossed: Vec<CrossedColumn>) -> Result<ColumnSpec> {
    if !dataset.has_column(target) {
        return Err(FeatureError::Schema(format!(
            "target column '{}' not found",
            target
        )));
    }

    let mut numerical = Vec::new();
    let mut categorical = Vec::new();
    for name in dataset.columns() {
        if name == target {
            continue;
        }
        match dataset.column_type(name) {
            Some(ColumnType::Text) => categorical.push(name.clone()),
            _ => numerical.push(name.clone()),
        }
    }

    let spec = ColumnSpec {
        numerical,
        categorical,
        target: target.to_string(),
        crossed,
    };
    spec.validate()?;

    debug!(
        numerical = spec.numerical.len(),
        categorical = spec.categorical.len(),
        crossed = spec.crossed.len(),
        "classified columns"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> RawDataset {
        RawDataset::new(
            vec![
                "age".into(),
                "education".into(),
                "occupation".into(),
                "income_label".into(),
            ],
            vec![
                vec![
                    Value::Number(39.0),
                    Value::Text("Bachelors".into()),
                    Value::Text("Sales".into()),
                    Value::Number(0.0),
                ],
                vec![
                    Value::Number(52.0),
                    Value::Text("Masters".into()),
                    Value::Text("Sales".into()),
                    Value::Number(1.0),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_classify_partitions_columns() {
        let crossed = vec![CrossedColumn::new("education", "occupation")];
        let spec = classify(&dataset(), "income_label", crossed).unwrap();

        assert_eq!(spec.numerical, vec!["age".to_string()]);
        assert_eq!(spec.categorical, vec!["education".to_string(), "occupation".to_string()]);
        assert_eq!(
            spec.output_columns(),
            vec!["age", "education", "occupation", "education-occupation"]
        );
        assert_eq!(spec.feature_count(), 4);
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let err = classify(&dataset(), "income_bracket", vec![]).unwrap_err();
        assert!(matches!(err, FeatureError::Schema(_)));
    }

    #[test]
    fn test_crossed_parent_must_be_categorical() {
        let crossed = vec![CrossedColumn::new("age", "occupation")];
        let err = classify(&dataset(), "income_label", crossed).unwrap_err();
        assert!(matches!(err, FeatureError::Schema(_)));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let spec = ColumnSpec {
            numerical: vec!["a".into()],
            categorical: vec!["a".into()],
            target: "y".into(),
            crossed: vec![],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_binarize_income_labels() {
        let rule = TargetRule::default();
        assert_eq!(rule.binarize_label(">50K"), 1);
        assert_eq!(rule.binarize_label(">50K."), 1);
        assert_eq!(rule.binarize_label("<=50K"), 0);
        assert_eq!(rule.binarize(&Value::Number(1.0), "y", 0).unwrap(), 1);
        assert!(rule.binarize(&Value::Number(2.0), "y", 0).is_err());
    }

    #[test]
    fn test_crossed_tokens_are_distinct() {
        let cross = CrossedColumn::new("education", "occupation");
        assert_ne!(
            cross.combine("Bachelors", "Sales"),
            cross.combine("Masters", "Sales")
        );
        assert_ne!(cross.combine("a", "bc"), cross.combine("ab", "c"));
    }
}

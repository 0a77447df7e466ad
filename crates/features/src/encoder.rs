//! Feature transformation: fit once, transform many times
//!
//! [`FeatureTools::fit`] learns a [`FittedEncoderState`] from training data:
//! a sorted category table per categorical and crossed column and scaling
//! parameters per numerical column. The state is immutable; every later
//! batch (held-out, incremental or inference data) is encoded through
//! [`FittedEncoderState::transform`] with exactly the same tables.
//!
//! Unseen categories are not an error. Each table reserves the code `k`
//! (its length) for tokens that were absent at fit time, so fitted codes
//! never shift.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::artifact::TrainedDataset;
use crate::columns::{ColumnSpec, CrossedColumn, TargetRule};
use crate::dataset::{RawDataset, Value};
use crate::errors::{FeatureError, Result};

/// Current encoder state format version
pub const ENCODER_FORMAT_VERSION: u32 = 1;

/// Token to dense code mapping; codes follow lexicographic token order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable {
    categories: Vec<String>,
}

impl CategoryTable {
    pub fn fit<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let distinct: BTreeSet<String> = tokens.into_iter().collect();
        Self {
            categories: distinct.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Code reserved for tokens not seen during fit
    pub fn unknown_code(&self) -> u32 {
        self.categories.len() as u32
    }

    pub fn encode(&self, token: &str) -> Option<u32> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(token))
            .ok()
            .map(|idx| idx as u32)
    }

    pub fn encode_or_unknown(&self, token: &str) -> u32 {
        self.encode(token).unwrap_or_else(|| self.unknown_code())
    }

    /// Token for a fitted code; `None` for the unknown code
    pub fn decode(&self, code: u32) -> Option<&str> {
        self.categories.get(code as usize).map(String::as_str)
    }

    fn validate(&self, column: &str) -> Result<()> {
        if self.categories.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FeatureError::Corrupt(format!(
                "category table for '{}' is not strictly sorted",
                column
            )));
        }
        Ok(())
    }
}

/// Requested scaling for numerical columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// Linear rescale of the observed range onto `[low, high]`
    MinMax { low: f64, high: f64 },
    /// Zero mean, unit (population) variance
    Standard,
}

impl Default for Scaler {
    fn default() -> Self {
        Scaler::MinMax { low: 0.0, high: 1.0 }
    }
}

/// Fitted scaling parameters for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerParams {
    MinMax {
        data_min: f64,
        data_max: f64,
        low: f64,
        high: f64,
    },
    Standard {
        mean: f64,
        std: f64,
    },
}

impl ScalerParams {
    fn fit(scaler: &Scaler, values: &[f64]) -> Self {
        match scaler {
            Scaler::MinMax { low, high } => {
                let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                ScalerParams::MinMax {
                    data_min,
                    data_max,
                    low: *low,
                    high: *high,
                }
            }
            Scaler::Standard => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                ScalerParams::Standard {
                    mean,
                    std: variance.sqrt(),
                }
            }
        }
    }

    /// Scale one value. Constant columns map to `low` (min-max) or 0 (standard).
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            ScalerParams::MinMax {
                data_min,
                data_max,
                low,
                high,
            } => {
                let range = data_max - data_min;
                let range = if range == 0.0 { 1.0 } else { range };
                low + (value - data_min) * (high - low) / range
            }
            ScalerParams::Standard { mean, std } => {
                let std = if std == 0.0 { 1.0 } else { std };
                (value - mean) / std
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericalEncoder {
    pub column: String,
    pub params: ScalerParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub column: String,
    pub table: CategoryTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossedEncoder {
    pub column: CrossedColumn,
    pub table: CategoryTable,
}

/// Per-batch count of tokens that were not seen at fit time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub unknown_categories: BTreeMap<String, usize>,
}

impl TransformReport {
    pub fn total_unknown(&self) -> usize {
        self.unknown_categories.values().sum()
    }
}

/// Learns encoders from a training dataset
#[derive(Debug, Clone, Default)]
pub struct FeatureTools {
    scaler: Scaler,
    target_rule: TargetRule,
}

impl FeatureTools {
    pub fn new(scaler: Scaler) -> Self {
        Self {
            scaler,
            target_rule: TargetRule::default(),
        }
    }

    pub fn with_target_rule(mut self, rule: TargetRule) -> Self {
        self.target_rule = rule;
        self
    }

    /// Fit encoders on `dataset`. The result does not depend on row order.
    #[instrument(skip_all, fields(rows = dataset.len()))]
    pub fn fit(&self, dataset: &RawDataset, spec: &ColumnSpec) -> Result<FittedEncoderState> {
        spec.validate()?;
        check_columns(dataset, spec, true)?;
        if dataset.is_empty() {
            return Err(FeatureError::Schema("cannot fit on an empty dataset".into()));
        }

        let target_idx = column_idx(dataset, &spec.target)?;
        for (row, cells) in dataset.rows().iter().enumerate() {
            self.target_rule.binarize(&cells[target_idx], &spec.target, row)?;
        }

        let numerical = spec
            .numerical
            .iter()
            .map(|name| {
                let values = numeric_column(dataset, name)?;
                Ok(NumericalEncoder {
                    column: name.clone(),
                    params: ScalerParams::fit(&self.scaler, &values),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let categorical = spec
            .categorical
            .iter()
            .map(|name| {
                let idx = column_idx(dataset, name)?;
                Ok(CategoricalEncoder {
                    column: name.clone(),
                    table: CategoryTable::fit(dataset.rows().iter().map(|row| row[idx].token())),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let crossed = spec
            .crossed
            .iter()
            .map(|cross| {
                let tokens = crossed_tokens(dataset, cross)?;
                Ok(CrossedEncoder {
                    column: cross.clone(),
                    table: CategoryTable::fit(tokens),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            numerical = numerical.len(),
            categorical = categorical.len(),
            crossed = crossed.len(),
            "encoder state fitted"
        );

        Ok(FittedEncoderState {
            format_version: ENCODER_FORMAT_VERSION,
            spec: spec.clone(),
            target_rule: self.target_rule.clone(),
            numerical,
            categorical,
            crossed,
        })
    }
}

/// Immutable encoders learned by [`FeatureTools::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoderState {
    format_version: u32,
    spec: ColumnSpec,
    target_rule: TargetRule,
    numerical: Vec<NumericalEncoder>,
    categorical: Vec<CategoricalEncoder>,
    crossed: Vec<CrossedEncoder>,
}

impl FittedEncoderState {
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn spec(&self) -> &ColumnSpec {
        &self.spec
    }

    pub fn target_rule(&self) -> &TargetRule {
        &self.target_rule
    }

    pub fn numerical(&self) -> &[NumericalEncoder] {
        &self.numerical
    }

    pub fn categorical(&self) -> &[CategoricalEncoder] {
        &self.categorical
    }

    pub fn crossed(&self) -> &[CrossedEncoder] {
        &self.crossed
    }

    /// Encoded column names in matrix order
    pub fn column_names(&self) -> Vec<String> {
        self.spec.output_columns()
    }

    pub fn categorical_column_names(&self) -> Vec<String> {
        self.spec.categorical_outputs()
    }

    /// Category table of a categorical or crossed output column
    pub fn table(&self, column: &str) -> Option<&CategoryTable> {
        self.categorical
            .iter()
            .find(|enc| enc.column == column)
            .map(|enc| &enc.table)
            .or_else(|| {
                self.crossed
                    .iter()
                    .find(|enc| enc.column.name() == column)
                    .map(|enc| &enc.table)
            })
    }

    pub fn decode(&self, column: &str, code: u32) -> Option<&str> {
        self.table(column)?.decode(code)
    }

    /// Check version and table invariants of a deserialized state
    pub fn validate(&self) -> Result<()> {
        if self.format_version != ENCODER_FORMAT_VERSION {
            return Err(FeatureError::UnsupportedFormat {
                found: self.format_version,
                expected: ENCODER_FORMAT_VERSION,
            });
        }
        self.spec.validate()?;

        let numerical: Vec<&str> = self.numerical.iter().map(|e| e.column.as_str()).collect();
        let categorical: Vec<&str> = self.categorical.iter().map(|e| e.column.as_str()).collect();
        let crossed: Vec<&CrossedColumn> = self.crossed.iter().map(|e| &e.column).collect();
        if numerical != self.spec.numerical.iter().map(String::as_str).collect::<Vec<_>>()
            || categorical != self.spec.categorical.iter().map(String::as_str).collect::<Vec<_>>()
            || crossed != self.spec.crossed.iter().collect::<Vec<_>>()
        {
            return Err(FeatureError::Corrupt("encoders do not match column spec".into()));
        }

        for enc in &self.categorical {
            enc.table.validate(&enc.column)?;
        }
        for enc in &self.crossed {
            enc.table.validate(&enc.column.name())?;
        }
        Ok(())
    }

    /// Encode features and target into the training artifact
    pub fn transform(&self, dataset: &RawDataset) -> Result<TrainedDataset> {
        self.transform_with_report(dataset).map(|(data, _)| data)
    }

    #[instrument(skip_all, fields(rows = dataset.len()))]
    pub fn transform_with_report(&self, dataset: &RawDataset) -> Result<(TrainedDataset, TransformReport)> {
        check_columns(dataset, &self.spec, true)?;

        let target_idx = column_idx(dataset, &self.spec.target)?;
        let target = dataset
            .rows()
            .iter()
            .enumerate()
            .map(|(row, cells)| self.target_rule.binarize(&cells[target_idx], &self.spec.target, row))
            .collect::<Result<Vec<u8>>>()?;

        let (features, report) = self.encode_features(dataset)?;
        let artifact = TrainedDataset::new(
            features,
            target,
            self.column_names(),
            self.categorical_column_names(),
        )?;
        Ok((artifact, report))
    }

    /// Encode feature columns only; the target column may be absent
    pub fn encode_features(&self, dataset: &RawDataset) -> Result<(Vec<Vec<f64>>, TransformReport)> {
        check_columns(dataset, &self.spec, false)?;

        let mut features = vec![Vec::with_capacity(self.spec.feature_count()); dataset.len()];
        let mut report = TransformReport::default();

        for enc in &self.numerical {
            let values = numeric_column(dataset, &enc.column)?;
            for (row, value) in features.iter_mut().zip(values) {
                row.push(enc.params.apply(value));
            }
        }

        for enc in &self.categorical {
            let idx = column_idx(dataset, &enc.column)?;
            let tokens = dataset.rows().iter().map(|row| row[idx].token());
            encode_tokens(&enc.column, &enc.table, tokens, &mut features, &mut report);
        }

        for enc in &self.crossed {
            let tokens = crossed_tokens(dataset, &enc.column)?;
            encode_tokens(&enc.column.name(), &enc.table, tokens, &mut features, &mut report);
        }

        Ok((features, report))
    }
}

fn encode_tokens<I>(
    column: &str,
    table: &CategoryTable,
    tokens: I,
    features: &mut [Vec<f64>],
    report: &mut TransformReport,
) where
    I: IntoIterator<Item = String>,
{
    let mut unknown = 0usize;
    for (row, token) in features.iter_mut().zip(tokens) {
        let code = match table.encode(&token) {
            Some(code) => code,
            None => {
                unknown += 1;
                table.unknown_code()
            }
        };
        row.push(f64::from(code));
    }

    if unknown > 0 {
        warn!(
            column,
            unknown,
            sentinel = table.unknown_code(),
            "unseen categories mapped to sentinel code"
        );
        report.unknown_categories.insert(column.to_string(), unknown);
    }
}

fn column_idx(dataset: &RawDataset, name: &str) -> Result<usize> {
    dataset.column_index(name).ok_or_else(|| FeatureError::SchemaMismatch {
        missing: vec![name.to_string()],
        unexpected: Vec::new(),
    })
}

/// All columns the spec reads must be present (target optional)
fn check_columns(dataset: &RawDataset, spec: &ColumnSpec, with_target: bool) -> Result<()> {
    let mut missing: Vec<String> = spec
        .feature_inputs()
        .filter(|name| !dataset.has_column(name))
        .map(str::to_string)
        .collect();
    if with_target && !dataset.has_column(&spec.target) {
        missing.push(spec.target.clone());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(FeatureError::SchemaMismatch {
            missing,
            unexpected: Vec::new(),
        })
    }
}

fn numeric_column(dataset: &RawDataset, name: &str) -> Result<Vec<f64>> {
    let idx = column_idx(dataset, name)?;
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(row, cells)| match &cells[idx] {
            Value::Number(n) => Ok(*n),
            other => Err(FeatureError::Parse {
                column: name.to_string(),
                row,
                message: format!("expected a number, found {:?}", other),
            }),
        })
        .collect()
}

fn crossed_tokens(dataset: &RawDataset, cross: &CrossedColumn) -> Result<Vec<String>> {
    let left = column_idx(dataset, &cross.left)?;
    let right = column_idx(dataset, &cross.right)?;
    Ok(dataset
        .rows()
        .iter()
        .map(|row| cross.combine(&row[left].token(), &row[right].token()))
        .collect())
}

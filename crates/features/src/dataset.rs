//! Raw tabular data
//!
//! A [`RawDataset`] is an ordered list of column names plus rows of typed
//! cells. CSV input goes through the `csv` crate; the incremental feed is
//! newline-delimited JSON whose records are aligned to the existing column
//! order before being appended.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{FeatureError, Result};

/// One cell of raw data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Interpret a raw delimited-text cell
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Value::Number(number),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String form used as a category token; missing cells become `""`
    pub fn token(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Missing => String::new(),
        }
    }

    fn from_json(value: serde_json::Value, column: &str, row: usize) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Value::Missing),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| {
                FeatureError::Parse {
                    column: column.to_string(),
                    row,
                    message: format!("number {} is not representable", n),
                }
            }),
            serde_json::Value::String(s) => Ok(Value::Text(s.trim().to_string())),
            serde_json::Value::Bool(b) => Ok(Value::Text(b.to_string())),
            other => Err(FeatureError::Parse {
                column: column.to_string(),
                row,
                message: format!("nested value {} is not a cell", other),
            }),
        }
    }
}

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Every non-missing cell is a number
    Numeric,
    /// At least one cell is text
    Text,
}

/// Row-oriented table with a fixed, ordered schema
#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(FeatureError::Schema(format!("duplicate column '{}'", name)));
            }
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(FeatureError::Schema(format!(
                    "row {} has {} cells, expected {}",
                    idx,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Load a delimited file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let dataset = Self::from_csv_reader(BufReader::new(file))?;
        info!(
            path = %path.as_ref().display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "loaded CSV dataset"
        );
        Ok(dataset)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse).collect());
        }

        Self::new(columns, rows)
    }

    /// Write the table back as CSV with a header row
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Value::token))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append newline-delimited JSON records, reordered to this table's columns
    pub fn append_jsonl<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut appended = Vec::new();

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&line)?;
            let row_idx = self.rows.len() + appended.len();
            let row = self
                .align_record(record, row_idx)
                .inspect_err(|err| debug!(line = line_idx + 1, %err, "rejected incremental record"))?;
            appended.push(row);
        }

        let count = appended.len();
        self.rows.extend(appended);
        Ok(count)
    }

    pub fn append_jsonl_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let file = File::open(path.as_ref())?;
        let count = self.append_jsonl(BufReader::new(file))?;
        info!(path = %path.as_ref().display(), records = count, "merged incremental records");
        Ok(count)
    }

    /// Append another table with the same column set (any order)
    pub fn append(&mut self, other: &RawDataset) -> Result<()> {
        self.check_same_columns(&other.columns)?;
        let positions: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|name| other.column_index(name))
            .collect();

        for row in &other.rows {
            self.rows
                .push(positions.iter().map(|&idx| row[idx].clone()).collect());
        }
        Ok(())
    }

    fn align_record(
        &self,
        mut record: serde_json::Map<String, serde_json::Value>,
        row_idx: usize,
    ) -> Result<Vec<Value>> {
        let keys: Vec<String> = record.keys().cloned().collect();
        self.check_same_columns(&keys)?;

        self.columns
            .iter()
            .map(|name| {
                let value = record.remove(name).unwrap_or(serde_json::Value::Null);
                Value::from_json(value, name, row_idx)
            })
            .collect()
    }

    fn check_same_columns(&self, names: &[String]) -> Result<()> {
        let expected: BTreeSet<&str> = self.columns.iter().map(String::as_str).collect();
        let found: BTreeSet<&str> = names.iter().map(String::as_str).collect();

        let missing: Vec<String> = expected.difference(&found).map(|s| s.to_string()).collect();
        let unexpected: Vec<String> = found.difference(&expected).map(|s| s.to_string()).collect();
        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(FeatureError::SchemaMismatch { missing, unexpected })
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        let mut cells = self.column(name)?;
        if cells.any(|v| matches!(v, Value::Text(_))) {
            Some(ColumnType::Text)
        } else {
            Some(ColumnType::Numeric)
        }
    }

    /// Remove a column and return its cells
    pub fn drop_column(&mut self, name: &str) -> Result<Vec<Value>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| FeatureError::Schema(format!("column '{}' not found", name)))?;
        self.columns.remove(idx);
        Ok(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// Add a column at the end
    pub fn push_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if self.has_column(name) {
            return Err(FeatureError::Schema(format!("column '{}' already exists", name)));
        }
        if values.len() != self.rows.len() {
            return Err(FeatureError::Schema(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}

//! Column-oriented table of mixed-type cells
//!
//! Every transformation returns a new table, so a stage that hands a table to
//! the next one never observes later changes.

use crate::core::{Result, SpareError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identifier column required by every pipeline
pub const ID_COLUMN: &str = "PTID";
/// Age column required by every pipeline
pub const AGE_COLUMN: &str = "Age";
/// Optional column carried into cross-validation results
pub const SEX_COLUMN: &str = "Sex";

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Parse a raw text cell; blanks and NA markers become `Missing`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "" | "NA" | "N/A" | "n/a" | "na" | "NaN" | "nan" | "null" | "None" => Value::Missing,
            _ => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Value::Number(v),
                _ => Value::Text(trimmed.to_string()),
            },
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text form used for identifiers, group labels and categorical keys
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Value::Missing
        } else {
            Value::Number(v)
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Ordered rows over named columns
#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    n_rows: usize,
}

impl TabularDataset {
    /// Build a table from row-major cells
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut data = vec![Vec::with_capacity(rows.len()); columns.len()];
        for row in &rows {
            if row.len() != columns.len() {
                return Err(SpareError::DimensionMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        for row in rows {
            for (col, value) in data.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Self::from_parts(columns, data)
    }

    fn from_parts(columns: Vec<String>, data: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(SpareError::InvalidParameter(format!(
                "duplicate column name: {dup}"
            )));
        }
        let n_rows = data.first().map_or(0, Vec::len);
        if let Some(bad) = data.iter().find(|c| c.len() != n_rows) {
            return Err(SpareError::DimensionMismatch {
                expected: n_rows,
                actual: bad.len(),
            });
        }
        Ok(Self {
            columns,
            data,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.position(name).map(|i| self.data[i].as_slice())
    }

    /// Column lookup that fails with `MissingColumn`
    pub fn require_column(&self, name: &str) -> Result<&[Value]> {
        self.column(name)
            .ok_or_else(|| SpareError::MissingColumn(name.to_string()))
    }

    /// Names from `wanted` that are not columns of this table, in input order
    pub fn missing_columns(&self, wanted: &[String]) -> Vec<String> {
        wanted
            .iter()
            .filter(|name| !self.has_column(name))
            .cloned()
            .collect()
    }

    /// Non-missing distinct values in first-seen order
    pub fn distinct_values(&self, name: &str) -> Result<Vec<Value>> {
        Ok(self
            .value_counts(name)?
            .into_iter()
            .map(|(value, _)| value)
            .collect())
    }

    /// Counts of non-missing values in first-seen order, keyed by text form
    pub fn value_counts(&self, name: &str) -> Result<Vec<(Value, usize)>> {
        let column = self.require_column(name)?;
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<(Value, usize)> = Vec::new();
        for value in column.iter().filter(|v| !v.is_missing()) {
            match index.get(&value.key()) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(value.key(), counts.len());
                    counts.push((value.clone(), 1));
                }
            }
        }
        Ok(counts)
    }

    /// Numeric view of a column; missing cells become NaN
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        self.require_column(name)?
            .iter()
            .map(|value| match value {
                Value::Number(v) => Ok(*v),
                Value::Missing => Ok(f64::NAN),
                Value::Text(s) => Err(SpareError::InvalidParameter(format!(
                    "column \"{name}\" has non-numeric value \"{s}\""
                ))),
            })
            .collect()
    }

    /// Row-major numeric matrix over `columns`
    pub fn feature_matrix(&self, columns: &[String]) -> Result<Vec<Vec<f64>>> {
        let numeric: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| self.numeric_column(c))
            .collect::<Result<_>>()?;
        Ok((0..self.n_rows)
            .map(|row| numeric.iter().map(|col| col[row]).collect())
            .collect())
    }

    /// Per-row flag: true when any of `columns` is missing in that row
    pub fn missing_mask(&self, columns: &[String]) -> Result<Vec<bool>> {
        let mut mask = vec![false; self.n_rows];
        for name in columns {
            for (flag, value) in mask.iter_mut().zip(self.require_column(name)?) {
                *flag |= value.is_missing();
            }
        }
        Ok(mask)
    }

    /// Per-row flag: true when the cell's text form is in `keys`
    pub fn isin(&self, name: &str, keys: &HashSet<String>) -> Result<Vec<bool>> {
        Ok(self
            .require_column(name)?
            .iter()
            .map(|v| !v.is_missing() && keys.contains(&v.key()))
            .collect())
    }

    /// Keep rows whose flag is true
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| if k { Some(i) } else { None })
            .collect();
        self.select_rows(&indices)
    }

    /// New table made of the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let data = self
            .data
            .iter()
            .map(|col| indices.iter().map(|&i| col[i].clone()).collect())
            .collect();
        Self {
            columns: self.columns.clone(),
            data,
            n_rows: indices.len(),
        }
    }

    /// Replace a column, or append it if absent
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Self> {
        if values.len() != self.n_rows {
            return Err(SpareError::DimensionMismatch {
                expected: self.n_rows,
                actual: values.len(),
            });
        }
        let mut next = self.clone();
        match next.position(name) {
            Some(i) => next.data[i] = values,
            None => {
                next.columns.push(name.to_string());
                next.data.push(values);
            }
        }
        Ok(next)
    }

    /// Rename columns according to `mapping` (old name -> new name)
    pub fn rename_columns(&self, mapping: &HashMap<String, String>) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect();
        Self::from_parts(columns, self.data.clone())
    }
}

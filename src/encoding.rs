//! Categorical predictor encoding
//!
//! Each predictor column is classified once into a [`ColumnKind`]. Two-valued
//! categorical columns are coded 1 and 2 in first-seen order; the coding is
//! stored in a [`CategoricalMap`] and replayed unchanged at inference.

use crate::core::{Result, SpareError};
use crate::data::{TabularDataset, Value};
use crate::report::Diagnostics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a predictor column is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    BinaryCategorical,
    /// Categorical with a number of levels other than two
    UnsupportedCategorical,
}

impl ColumnKind {
    /// Classify a column: any text cell makes it categorical
    pub fn classify(table: &TabularDataset, column: &str) -> Result<Self> {
        let values = table.require_column(column)?;
        if !values.iter().any(|v| matches!(v, Value::Text(_))) {
            return Ok(ColumnKind::Numeric);
        }
        if table.distinct_values(column)?.len() == 2 {
            Ok(ColumnKind::BinaryCategorical)
        } else {
            Ok(ColumnKind::UnsupportedCategorical)
        }
    }
}

/// Coding of a two-valued column: `levels[0]` -> 1, `levels[1]` -> 2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryCoding {
    levels: Vec<String>,
}

impl BinaryCoding {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            levels: vec![first.into(), second.into()],
        }
    }

    /// Numeric code of a value, if it is one of the levels
    pub fn code(&self, value: &str) -> Option<f64> {
        self.levels
            .iter()
            .position(|level| level == value)
            .map(|i| (i + 1) as f64)
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }
}

/// Categorical predictors and their coding; `None` marks a column that had no
/// usable coding and was left out of the model
pub type CategoricalMap = BTreeMap<String, Option<BinaryCoding>>;

/// Result of encoding a training table
#[derive(Debug, Clone)]
pub struct EncodedTable {
    pub table: TabularDataset,
    /// Predictors that remain usable, in input order
    pub predictors: Vec<String>,
    pub map: CategoricalMap,
}

/// Classify, code and replace categorical predictor columns
pub fn encode_predictors(
    table: &TabularDataset,
    predictors: &[String],
    diagnostics: &mut Diagnostics,
) -> Result<EncodedTable> {
    let mut encoded = table.clone();
    let mut kept = Vec::with_capacity(predictors.len());
    let mut map = CategoricalMap::new();

    for name in predictors {
        match ColumnKind::classify(table, name)? {
            ColumnKind::Numeric => kept.push(name.clone()),
            ColumnKind::BinaryCategorical => {
                let levels = table.distinct_values(name)?;
                let coding = BinaryCoding::new(levels[0].key(), levels[1].key());
                encoded = encoded.with_column(name, apply_coding(table, name, &coding)?)?;
                diagnostics.info(format!(
                    "Encoded categorical predictor \"{}\": {} -> 1, {} -> 2",
                    name,
                    coding.levels()[0],
                    coding.levels()[1]
                ));
                map.insert(name.clone(), Some(coding));
                kept.push(name.clone());
            }
            ColumnKind::UnsupportedCategorical => {
                let n_levels = table.distinct_values(name)?.len();
                diagnostics.warn(format!(
                    "Predictor \"{name}\" is categorical with {n_levels} distinct values; \
                     only two-valued categoricals can be encoded, so it is excluded"
                ));
                map.insert(name.clone(), None);
            }
        }
    }

    Ok(EncodedTable {
        table: encoded,
        predictors: kept,
        map,
    })
}

/// Re-apply a stored coding to a new table
///
/// Columns recorded as `None` are left untouched; they are not predictors of
/// the model. Columns absent from the table are skipped.
pub fn replay_encoding(table: &TabularDataset, map: &CategoricalMap) -> Result<TabularDataset> {
    let mut encoded = table.clone();
    for (name, coding) in map {
        if let (Some(coding), true) = (coding, table.has_column(name)) {
            encoded = encoded.with_column(name, apply_coding(table, name, coding)?)?;
        }
    }
    Ok(encoded)
}

fn apply_coding(table: &TabularDataset, name: &str, coding: &BinaryCoding) -> Result<Vec<Value>> {
    table
        .require_column(name)?
        .iter()
        .map(|value| match value {
            Value::Missing => Ok(Value::Missing),
            other => coding.code(&other.key()).map(Value::Number).ok_or_else(|| {
                SpareError::UnknownCategoricalValue {
                    column: name.to_string(),
                    value: other.key(),
                    expected: coding.levels().to_vec(),
                }
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort() -> TabularDataset {
        TabularDataset::new(
            vec!["PTID".into(), "Sex".into(), "Site".into(), "ROI_1".into()],
            vec![
                vec!["a".into(), "M".into(), "s1".into(), 1.0.into()],
                vec!["b".into(), "F".into(), "s2".into(), 2.0.into()],
                vec!["c".into(), "M".into(), "s3".into(), 3.0.into()],
                vec!["d".into(), Value::Missing, "s1".into(), 4.0.into()],
            ],
        )
        .unwrap()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_columns() {
        let table = cohort();
        assert_eq!(ColumnKind::classify(&table, "ROI_1").unwrap(), ColumnKind::Numeric);
        assert_eq!(
            ColumnKind::classify(&table, "Sex").unwrap(),
            ColumnKind::BinaryCategorical
        );
        assert_eq!(
            ColumnKind::classify(&table, "Site").unwrap(),
            ColumnKind::UnsupportedCategorical
        );
    }

    #[test]
    fn test_binary_coding_first_seen_order() {
        let mut diag = Diagnostics::new();
        let encoded = encode_predictors(&cohort(), &names(&["Sex", "ROI_1"]), &mut diag).unwrap();

        let coding = encoded.map["Sex"].as_ref().unwrap();
        assert_eq!(coding.levels(), &["M".to_string(), "F".to_string()]);
        let sex = encoded.table.numeric_column("Sex").unwrap();
        assert_eq!(&sex[..3], &[1.0, 2.0, 1.0]);
        assert!(sex[3].is_nan());
        assert_eq!(encoded.predictors, names(&["Sex", "ROI_1"]));
    }

    #[test]
    fn test_multi_valued_categorical_is_excluded_with_warning() {
        let mut diag = Diagnostics::new();
        let encoded =
            encode_predictors(&cohort(), &names(&["Site", "ROI_1"]), &mut diag).unwrap();

        assert_eq!(encoded.predictors, names(&["ROI_1"]));
        assert_eq!(encoded.map.get("Site"), Some(&None));
        assert!(diag.has_warning("Site"));
    }

    #[test]
    fn test_replay_reproduces_training_codes() {
        let mut diag = Diagnostics::new();
        let table = cohort();
        let encoded = encode_predictors(&table, &names(&["Sex"]), &mut diag).unwrap();

        let replayed = replay_encoding(&table, &encoded.map).unwrap();
        let a = replayed.numeric_column("Sex").unwrap();
        let b = encoded.table.numeric_column("Sex").unwrap();
        assert_eq!(&a[..3], &b[..3]);
    }

    #[test]
    fn test_replay_unknown_value_fails() {
        let mut map = CategoricalMap::new();
        map.insert("Sex".into(), Some(BinaryCoding::new("M", "F")));
        let table = TabularDataset::new(
            vec!["Sex".into()],
            vec![vec!["M".into()], vec!["X".into()]],
        )
        .unwrap();

        match replay_encoding(&table, &map) {
            Err(SpareError::UnknownCategoricalValue {
                column,
                value,
                expected,
            }) => {
                assert_eq!(column, "Sex");
                assert_eq!(value, "X");
                assert_eq!(expected, vec!["M".to_string(), "F".to_string()]);
            }
            other => panic!("expected UnknownCategoricalValue, got {other:?}"),
        }
    }

    #[test]
    fn test_coding_serde() {
        let coding = BinaryCoding::new("CN", "AD");
        let json = serde_json::to_string(&coding).unwrap();
        let back: BinaryCoding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coding);
        assert_eq!(back.code("AD"), Some(2.0));
        assert_eq!(back.code("MCI"), None);
    }
}

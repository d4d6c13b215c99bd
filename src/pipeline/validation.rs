//! Input validation and model-type detection for training
//!
//! Every check here runs before any model is fitted, so a rejected table never
//! produces an artifact or an output file.

use crate::core::{Result, SpareError, SpareType};
use crate::data::{TabularDataset, Value, AGE_COLUMN, ID_COLUMN};
use crate::report::Diagnostics;
use std::collections::HashSet;

/// Smallest group (classification) or sample (regression) that can be fitted
pub const MIN_GROUP_SIZE: usize = 10;
/// Below this size a model is fitted but flagged as possibly unstable
pub const ROBUST_GROUP_SIZE: usize = 100;

/// Training input that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedInput {
    pub spare_type: SpareType,
    /// Rows with a target and complete predictors
    pub table: TabularDataset,
    /// Predictors with the variable to predict removed
    pub predictors: Vec<String>,
    /// Negative then positive group, classification only
    pub groups: Option<[String; 2]>,
}

impl ValidatedInput {
    pub fn positive_group(&self) -> Option<&str> {
        self.groups.as_ref().map(|g| g[1].as_str())
    }
}

/// Check a training table and decide the model type
pub fn validate_training_input(
    table: &TabularDataset,
    predictors: &[String],
    to_predict: &str,
    pos_group: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Result<ValidatedInput> {
    for required in [ID_COLUMN, AGE_COLUMN, to_predict] {
        table.require_column(required)?;
    }
    let missing = table.missing_columns(predictors);
    if !missing.is_empty() {
        return Err(SpareError::MissingPredictors(missing));
    }

    let counts = table.value_counts(to_predict)?;
    let (spare_type, groups) = match counts.len() {
        2 => {
            let groups = check_classification_target(table, to_predict, &counts, pos_group, diagnostics)?;
            (SpareType::Classification, Some(groups))
        }
        n if n > 2 => {
            check_regression_target(table, to_predict, &counts, pos_group, diagnostics)?;
            (SpareType::Regression, None)
        }
        _ => return Err(SpareError::NoVariance(to_predict.to_string())),
    };

    let mut kept: Vec<String> = Vec::with_capacity(predictors.len());
    for name in predictors {
        if name == to_predict {
            diagnostics.info(format!(
                "Variable to predict \"{to_predict}\" is in the predictor set; it will be removed from the set"
            ));
        } else if !kept.contains(name) {
            kept.push(name.clone());
        }
    }
    if kept.is_empty() {
        return Err(SpareError::EmptyPredictors);
    }

    let target_missing = table.missing_mask(&[to_predict.to_string()])?;
    let predictor_missing = table.missing_mask(&kept)?;
    let n_no_target = target_missing.iter().filter(|&&m| m).count();
    if n_no_target > 0 {
        diagnostics.info(format!(
            "{n_no_target} participants have no value for \"{to_predict}\"; they will be excluded from the training set"
        ));
    }
    let n_invalid = predictor_missing
        .iter()
        .zip(&target_missing)
        .filter(|&(p, t)| *p && !*t)
        .count();
    if n_invalid > 0 {
        diagnostics.info(format!(
            "{n_invalid} participants have invalid predictor variables (such as n/a); they will be excluded from the training set"
        ));
    }
    let keep: Vec<bool> = predictor_missing
        .iter()
        .zip(&target_missing)
        .map(|(&p, &t)| !p && !t)
        .collect();

    Ok(ValidatedInput {
        spare_type,
        table: table.filter_rows(&keep),
        predictors: kept,
        groups,
    })
}

fn check_classification_target(
    table: &TabularDataset,
    to_predict: &str,
    counts: &[(Value, usize)],
    pos_group: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Result<[String; 2]> {
    let observed: Vec<String> = counts.iter().map(|(v, _)| v.key()).collect();
    let positive = match pos_group {
        None | Some("") => return Err(SpareError::MissingPositiveGroup),
        Some(group) if observed.iter().any(|o| o == group) => group.to_string(),
        Some(group) => {
            return Err(SpareError::InvalidPositiveGroup {
                given: group.to_string(),
                observed,
            })
        }
    };

    if let Some((value, count)) = counts.iter().min_by_key(|(_, c)| *c) {
        if *count < MIN_GROUP_SIZE {
            return Err(SpareError::InsufficientGroupSize {
                group: value.key(),
                count: *count,
                minimum: MIN_GROUP_SIZE,
            });
        }
        if *count < ROBUST_GROUP_SIZE {
            diagnostics.warn(format!(
                "Group \"{}\" (n={}) may be too small to build a robust SPARE classification model (n<{})",
                value.key(),
                count,
                ROBUST_GROUP_SIZE
            ));
        }
    }

    let ids = table.require_column(ID_COLUMN)?;
    let targets = table.require_column(to_predict)?;
    let pairs: Vec<(String, String)> = ids
        .iter()
        .zip(targets)
        .filter(|(_, t)| !t.is_missing())
        .map(|(id, t)| (id.key(), t.key()))
        .collect();
    if has_duplicates(&pairs) {
        diagnostics.warn("Training dataset has duplicate participants");
    }

    let negative = observed
        .into_iter()
        .find(|o| *o != positive)
        .unwrap_or_default();
    Ok([negative, positive])
}

fn check_regression_target(
    table: &TabularDataset,
    to_predict: &str,
    counts: &[(Value, usize)],
    pos_group: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    if let Some((value, _)) = counts.iter().find(|(v, _)| !v.is_numeric()) {
        return Err(SpareError::NonNumericTarget {
            column: to_predict.to_string(),
            value: value.key(),
        });
    }

    let n: usize = counts.iter().map(|(_, c)| c).sum();
    if n < MIN_GROUP_SIZE {
        return Err(SpareError::InsufficientSampleSize {
            count: n,
            minimum: MIN_GROUP_SIZE,
        });
    }
    if n < ROBUST_GROUP_SIZE {
        diagnostics.warn(format!(
            "Sample size (n={n}) may be too small to build a robust SPARE regression model (n<{ROBUST_GROUP_SIZE})"
        ));
    }

    let ids: Vec<String> = table
        .require_column(ID_COLUMN)?
        .iter()
        .map(Value::key)
        .collect();
    if has_duplicates(&ids) {
        diagnostics.warn("Training dataset has duplicate participants");
    }

    if matches!(pos_group, Some(g) if !g.is_empty()) {
        diagnostics.info("SPARE regression model does not need a positive group; it will be ignored");
    }
    Ok(())
}

fn has_duplicates<T: Eq + std::hash::Hash>(items: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(item))
}

/// ±1 labels with the positive group mapped to +1
pub fn classification_labels(table: &TabularDataset, to_predict: &str, positive: &str) -> Result<Vec<f64>> {
    Ok(table
        .require_column(to_predict)?
        .iter()
        .map(|v| if v.key() == positive { 1.0 } else { -1.0 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn cohort(targets: Vec<Value>) -> TabularDataset {
        let rows = targets
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                vec![
                    Value::Text(format!("s{i}")),
                    Value::Number(60.0 + i as f64),
                    Value::Number(i as f64),
                    t,
                ]
            })
            .collect();
        TabularDataset::new(names(&["PTID", "Age", "ROI_1", "Dx"]), rows).unwrap()
    }

    fn groups(n_cn: usize, n_ad: usize) -> Vec<Value> {
        let mut t = vec![Value::from("CN"); n_cn];
        t.extend(vec![Value::from("AD"); n_ad]);
        t
    }

    #[test]
    fn test_classification_detected() {
        let table = cohort(groups(110, 40));
        let mut diag = Diagnostics::new();
        let input =
            validate_training_input(&table, &names(&["ROI_1"]), "Dx", Some("AD"), &mut diag).unwrap();

        assert_eq!(input.spare_type, SpareType::Classification);
        assert_eq!(input.groups, Some(["CN".to_string(), "AD".to_string()]));
        assert_eq!(input.positive_group(), Some("AD"));
        assert!(diag.has_warning("too small"));
    }

    #[test]
    fn test_classification_group_errors() {
        let table = cohort(groups(30, 20));
        let mut diag = Diagnostics::new();
        let preds = names(&["ROI_1"]);

        assert!(matches!(
            validate_training_input(&table, &preds, "Dx", None, &mut diag),
            Err(SpareError::MissingPositiveGroup)
        ));
        assert!(matches!(
            validate_training_input(&table, &preds, "Dx", Some("MCI"), &mut diag),
            Err(SpareError::InvalidPositiveGroup { .. })
        ));

        let small = cohort(groups(30, 9));
        assert!(matches!(
            validate_training_input(&small, &preds, "Dx", Some("AD"), &mut diag),
            Err(SpareError::InsufficientGroupSize { count: 9, .. })
        ));
    }

    #[test]
    fn test_regression_detected() {
        let targets = (0..120).map(|i| Value::Number(f64::from(i % 7))).collect();
        let table = cohort(targets);
        let mut diag = Diagnostics::new();
        let input =
            validate_training_input(&table, &names(&["ROI_1"]), "Dx", Some("AD"), &mut diag).unwrap();

        assert_eq!(input.spare_type, SpareType::Regression);
        assert!(input.groups.is_none());
        assert!(diag.has_info("positive group"));
        assert_eq!(diag.warnings().count(), 0);
    }

    #[test]
    fn test_regression_errors() {
        let mut diag = Diagnostics::new();
        let preds = names(&["ROI_1"]);

        let tiny = cohort(vec![1.0.into(), 2.0.into(), 3.0.into(), 1.0.into(), 2.0.into(), 3.0.into(), 1.0.into(), 2.0.into()]);
        assert!(matches!(
            validate_training_input(&tiny, &preds, "Dx", None, &mut diag),
            Err(SpareError::InsufficientSampleSize { count: 8, .. })
        ));

        let text = cohort(vec!["CN".into(), "AD".into(), "MCI".into()]);
        assert!(matches!(
            validate_training_input(&text, &preds, "Dx", None, &mut diag),
            Err(SpareError::NonNumericTarget { .. })
        ));

        let constant = cohort(vec![1.0.into(); 20]);
        assert!(matches!(
            validate_training_input(&constant, &preds, "Dx", None, &mut diag),
            Err(SpareError::NoVariance(_))
        ));
    }

    #[test]
    fn test_missing_columns() {
        let table = cohort(groups(20, 20));
        let mut diag = Diagnostics::new();
        match validate_training_input(&table, &names(&["ROI_1", "ROI_9", "ROI_7"]), "Dx", Some("AD"), &mut diag) {
            Err(SpareError::MissingPredictors(missing)) => {
                assert_eq!(missing, names(&["ROI_9", "ROI_7"]))
            }
            other => panic!("expected MissingPredictors, got {other:?}"),
        }
        assert!(matches!(
            validate_training_input(&table, &names(&["ROI_1"]), "Diagnosis", Some("AD"), &mut diag),
            Err(SpareError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_target_removed_from_predictors() {
        let targets = (0..30).map(|i| Value::Number(f64::from(i))).collect();
        let table = cohort(targets);
        let mut diag = Diagnostics::new();
        let input =
            validate_training_input(&table, &names(&["ROI_1", "Dx"]), "Dx", None, &mut diag).unwrap();
        assert_eq!(input.predictors, names(&["ROI_1"]));
        assert!(diag.has_info("removed"));

        assert!(matches!(
            validate_training_input(&table, &names(&["Dx"]), "Dx", None, &mut diag),
            Err(SpareError::EmptyPredictors)
        ));
    }

    #[test]
    fn test_rows_with_missing_values_dropped() {
        let mut targets: Vec<Value> = (0..30).map(|i| Value::Number(f64::from(i))).collect();
        targets[3] = Value::Missing;
        let table = cohort(targets)
            .with_column(
                "ROI_2",
                (0..30)
                    .map(|i| if i == 5 { Value::Missing } else { Value::Number(1.0) })
                    .collect(),
            )
            .unwrap();
        let mut diag = Diagnostics::new();
        let input =
            validate_training_input(&table, &names(&["ROI_1", "ROI_2"]), "Dx", None, &mut diag).unwrap();
        assert_eq!(input.table.n_rows(), 28);
        assert!(diag.has_info("invalid predictor"));
        assert_eq!(table.n_rows(), 30);
    }

    #[test]
    fn test_duplicate_participants_warned() {
        let mut table = cohort(groups(20, 20));
        // s21 repeats s20, both in the AD group
        let ids = (0..40)
            .map(|i| Value::Text(format!("s{}", if i == 21 { 20 } else { i })))
            .collect();
        table = table.with_column("PTID", ids).unwrap();
        let mut diag = Diagnostics::new();
        validate_training_input(&table, &names(&["ROI_1"]), "Dx", Some("AD"), &mut diag).unwrap();
        assert!(diag.has_warning("duplicate"));
    }

    #[test]
    fn test_labels() {
        let table = cohort(groups(2, 1));
        let labels = classification_labels(&table, "Dx", "AD").unwrap();
        assert_eq!(labels, vec![-1.0, -1.0, 1.0]);
    }
}

//! Inference pipeline: apply a persisted SPARE model to a new table

use crate::core::{Result, SpareError, SpareType};
use crate::data::{write_scores_csv, TabularDataset, AGE_COLUMN, ID_COLUMN};
use crate::encoding::replay_encoding;
use crate::persistence::{model_stem, SpareModelArtifact};
use crate::report::Diagnostics;
use crate::utils::stats::nan_mean;
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of an inference run
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    /// One SPARE score per input row, NaN when no fold could score the row
    pub scores: Vec<f64>,
    /// Per fold, per row scores; NaN where the row trained that fold
    pub fold_scores: Vec<Vec<f64>>,
    pub diagnostics: Diagnostics,
    /// Where the scores were written, if they were
    pub output_path: Option<PathBuf>,
}

/// Load a model from disk and score a table with it
///
/// With `out_dir`, scores are also written to
/// `<out_dir>/SPAREs_from_<model stem>.csv`.
pub fn spare_test<P: AsRef<Path>>(
    table: &TabularDataset,
    artifact_path: P,
    out_dir: Option<&Path>,
) -> Result<InferenceOutcome> {
    let artifact_path = artifact_path.as_ref();
    let artifact = SpareModelArtifact::load_from_file(artifact_path)?;
    let mut outcome = apply_model(table, &artifact)?;

    if let Some(dir) = out_dir {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("SPAREs_from_{}.csv", model_stem(artifact_path)));
        write_scores_csv(&path, &outcome.scores)?;
        outcome
            .diagnostics
            .info(format!("SPARE scores saved to {}", path.display()));
        outcome.output_path = Some(path);
    }
    Ok(outcome)
}

/// Score a table with an already loaded model
pub fn apply_model(table: &TabularDataset, artifact: &SpareModelArtifact) -> Result<InferenceOutcome> {
    let meta = &artifact.metadata;
    let mut diagnostics = Diagnostics::new();

    table.require_column(ID_COLUMN)?;
    table.require_column(AGE_COLUMN)?;
    let table = reconcile_predictors(table, &meta.predictors, &mut diagnostics)?;

    let ages = table.numeric_column(AGE_COLUMN)?;
    if ages
        .iter()
        .any(|&a| a < meta.age_range[0] || a > meta.age_range[1])
    {
        diagnostics.warn("Some participants fall outside of the age range of the SPARE model");
    }
    if table.missing_mask(&meta.predictors)?.into_iter().any(|m| m) {
        diagnostics.warn("Some participants have invalid predictor variables");
    }
    let training_ids = meta.training_ids();
    let overlap = table.isin(ID_COLUMN, &training_ids)?;
    let n_overlap = overlap.iter().filter(|&&o| o).count();
    if n_overlap > 0 {
        diagnostics.info(format!(
            "{n_overlap} participants have matching IDs to IDs from the training sample; \
             only models where they were left out from the training will be used for testing"
        ));
    }

    let table = replay_encoding(&table, &meta.categorical_var_map)?;

    diagnostics.info(format!(
        "Model Info: training N = {} / ages = {} - {} / expected {} = {:.3}",
        meta.n,
        meta.age_range[0],
        meta.age_range[1],
        meta.performance.label(),
        meta.performance.mean()
    ));

    let features = table.feature_matrix(&meta.predictors)?;
    let ensemble = &artifact.model;
    let fold_scores: Vec<Vec<f64>> = (0..ensemble.len())
        .into_par_iter()
        .map(|fold| -> Result<Vec<f64>> {
            let scaler = &ensemble.scalers[fold];
            let model = &ensemble.models[fold];
            let trained_on = table.isin(
                ID_COLUMN,
                &meta.fold_training_ids(&ensemble.cv_folds[fold]),
            )?;
            let bias = match (meta.spare_type, &ensemble.bias_correct) {
                (SpareType::Regression, Some(bias)) => Some(bias[fold]),
                _ => None,
            };

            Ok(features
                .iter()
                .zip(trained_on)
                .map(|(row, leaked)| {
                    if leaked {
                        return f64::NAN;
                    }
                    let raw = model.decision_function(&scaler.transform(row));
                    bias.map_or(raw, |b| b.apply(raw))
                })
                .collect())
        })
        .collect::<Result<_>>()?;

    let scores: Vec<f64> = (0..table.n_rows())
        .map(|row| {
            let per_fold: Vec<f64> = fold_scores.iter().map(|fold| fold[row]).collect();
            nan_mean(&per_fold)
        })
        .collect();
    debug!(
        "Scored {} rows with {} fold models",
        scores.len(),
        fold_scores.len()
    );

    Ok(InferenceOutcome {
        scores,
        fold_scores,
        diagnostics,
        output_path: None,
    })
}

/// Rename alternate predictor columns to the names the model expects
///
/// Only predictors missing from the table are considered. Each must contain
/// `_`; the suffix after the last `_` is tried as an integer (`ROI_0101` ->
/// `101`), as is (`ROI_0101` -> `0101`) and with an `R` prefix
/// (`ROI_0101` -> `R0101`). The first convention under which every missing
/// predictor exists wins.
pub fn reconcile_predictors(
    table: &TabularDataset,
    predictors: &[String],
    diagnostics: &mut Diagnostics,
) -> Result<TabularDataset> {
    let mut missing = table.missing_columns(predictors);
    if missing.is_empty() {
        return Ok(table.clone());
    }
    missing.sort();
    if missing.iter().any(|name| !name.contains('_')) {
        return Err(SpareError::MissingPredictors(missing));
    }

    let suffixes: Vec<&str> = missing
        .iter()
        .map(|name| name.rsplit('_').next().unwrap_or_default())
        .collect();
    let conventions: [Option<Vec<String>>; 3] = [
        suffixes
            .iter()
            .map(|s| s.parse::<i64>().ok().map(|v| v.to_string()))
            .collect(),
        Some(suffixes.iter().map(|s| s.to_string()).collect()),
        Some(suffixes.iter().map(|s| format!("R{s}")).collect()),
    ];

    for alternates in conventions.into_iter().flatten() {
        if table.missing_columns(&alternates).is_empty() {
            let mapping: HashMap<String, String> = alternates
                .iter()
                .cloned()
                .zip(missing.iter().cloned())
                .collect();
            diagnostics.info(format!(
                "ROI names changed to match the model (e.g. {} to {})",
                alternates[0], missing[0]
            ));
            return table.rename_columns(&mapping);
        }
    }
    Err(SpareError::MissingPredictors(missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn table_with(columns: &[&str]) -> TabularDataset {
        TabularDataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            vec![columns.iter().map(|_| Value::Number(1.0)).collect()],
        )
        .unwrap()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_noop() {
        let table = table_with(&["PTID", "ROI_101"]);
        let mut diag = Diagnostics::new();
        let out = reconcile_predictors(&table, &names(&["ROI_101"]), &mut diag).unwrap();
        assert_eq!(out, table);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_reconcile_integer_suffix() {
        let table = table_with(&["PTID", "101", "ROI_2"]);
        let mut diag = Diagnostics::new();
        let out =
            reconcile_predictors(&table, &names(&["ROI_0101", "ROI_2"]), &mut diag).unwrap();
        assert!(out.has_column("ROI_0101"));
        assert!(!out.has_column("101"));
        assert!(diag.has_info("ROI names changed"));
    }

    #[test]
    fn test_reconcile_raw_and_prefixed_suffix() {
        let mut diag = Diagnostics::new();
        let out = reconcile_predictors(&table_with(&["0101"]), &names(&["ROI_0101"]), &mut diag)
            .unwrap();
        assert!(out.has_column("ROI_0101"));

        let out = reconcile_predictors(&table_with(&["R47"]), &names(&["MUSE_47"]), &mut diag)
            .unwrap();
        assert!(out.has_column("MUSE_47"));

        // non-integer suffix skips the integer convention
        let out = reconcile_predictors(&table_with(&["Rleft"]), &names(&["ROI_left"]), &mut diag)
            .unwrap();
        assert!(out.has_column("ROI_left"));
    }

    #[test]
    fn test_reconcile_failures() {
        let mut diag = Diagnostics::new();
        match reconcile_predictors(&table_with(&["PTID"]), &names(&["ROI_101"]), &mut diag) {
            Err(SpareError::MissingPredictors(m)) => assert_eq!(m, names(&["ROI_101"])),
            other => panic!("expected MissingPredictors, got {other:?}"),
        }
        // names without an underscore are never reconciled
        assert!(matches!(
            reconcile_predictors(&table_with(&["101"]), &names(&["Volume"]), &mut diag),
            Err(SpareError::MissingPredictors(_))
        ));
        // partial resolution is not enough
        assert!(matches!(
            reconcile_predictors(&table_with(&["101"]), &names(&["ROI_101", "ROI_102"]), &mut diag),
            Err(SpareError::MissingPredictors(m)) if m.len() == 2
        ));
    }
}

//! Training pipeline: validated table to persisted SPARE model

use super::validation::{classification_labels, validate_training_input};
use crate::core::{OptimizerConfig, Result, SpareError, SpareType};
use crate::data::{TabularDataset, AGE_COLUMN, ID_COLUMN, SEX_COLUMN};
use crate::encoding::encode_predictors;
use crate::ensemble::{
    fit_ensemble, EnsembleConfig, EnsembleFit, DEFAULT_FOLDS, DEFAULT_REPEATS, DEFAULT_SEED,
};
use crate::kernel::KernelType;
use crate::persistence::{
    default_model_name, model_file_name, CvResult, Performance, SpareEnsemble, SpareMetadata,
    SpareModelArtifact,
};
use crate::report::Diagnostics;
use crate::search::{
    stratified_subsample_indices, subsample_indices, ParamGrid, REFINEMENT_SAMPLE_SIZE,
    REFINEMENT_SEED, REFINEMENT_THRESHOLD,
};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Settings of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub kernel: KernelType,
    /// Group that receives positive scores; classification only
    pub pos_group: Option<String>,
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
    /// Starting grid; the default for the model type when `None`
    pub param_grid: Option<ParamGrid>,
    pub optimizer: OptimizerConfig,
    /// Directory to save the model into; nothing is written when `None`
    pub output_dir: Option<PathBuf>,
    /// Model name; `SPARE_<type>_<target>` when `None`
    pub model_name: Option<String>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            kernel: KernelType::Linear,
            pos_group: None,
            folds: DEFAULT_FOLDS,
            repeats: DEFAULT_REPEATS,
            seed: DEFAULT_SEED,
            param_grid: None,
            optimizer: OptimizerConfig::default(),
            output_dir: None,
            model_name: None,
        }
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: SpareModelArtifact,
    pub diagnostics: Diagnostics,
    /// Where the model was saved, if it was
    pub saved_to: Option<PathBuf>,
}

/// Train a SPARE model
pub fn spare_train(
    table: &TabularDataset,
    predictors: &[String],
    to_predict: &str,
    options: &TrainingOptions,
) -> Result<TrainOutcome> {
    let mut diagnostics = Diagnostics::new();
    let input = validate_training_input(
        table,
        predictors,
        to_predict,
        options.pos_group.as_deref(),
        &mut diagnostics,
    )?;
    let spare_type = input.spare_type;

    let encoded = encode_predictors(&input.table, &input.predictors, &mut diagnostics)?;
    if encoded.predictors.is_empty() {
        return Err(SpareError::EmptyPredictors);
    }
    let data = encoded.table;
    let predictors = encoded.predictors;

    let grid = options
        .param_grid
        .clone()
        .unwrap_or_else(|| ParamGrid::default_for(spare_type, options.kernel));
    grid.validate(spare_type)?;

    let features = data.feature_matrix(&predictors)?;
    let targets = match input.positive_group() {
        Some(positive) => classification_labels(&data, to_predict, positive)?,
        None => data.numeric_column(to_predict)?,
    };
    let config = EnsembleConfig {
        kernel: options.kernel,
        folds: options.folds,
        repeats: options.repeats,
        seed: options.seed,
        optimizer: options.optimizer.clone(),
    };

    let grid = if features.len() > REFINEMENT_THRESHOLD {
        let rows = match spare_type {
            SpareType::Classification => stratified_subsample_indices(
                &targets,
                REFINEMENT_SAMPLE_SIZE,
                options.folds,
                REFINEMENT_SEED,
            ),
            SpareType::Regression => {
                subsample_indices(features.len(), REFINEMENT_SAMPLE_SIZE, REFINEMENT_SEED)
            }
        };
        let sub_x: Vec<Vec<f64>> = rows.iter().map(|&i| features[i].clone()).collect();
        let sub_y: Vec<f64> = rows.iter().map(|&i| targets[i]).collect();
        let coarse = fit_ensemble(
            &sub_x,
            &sub_y,
            spare_type,
            &grid,
            &EnsembleConfig {
                repeats: 1,
                ..config.clone()
            },
        )
        .map_err(|e| name_groups(e, input.groups.as_ref()))?;
        let refined = grid.refine(&coarse.optimal_params());
        diagnostics.info(format!(
            "Refined parameter grid on a {}-row subsample: {} -> {} candidates",
            rows.len(),
            grid.len(),
            refined.len()
        ));
        refined
    } else {
        grid
    };

    info!(
        "Training SPARE {} model ({} kernel) on {} participants with {} predictors",
        spare_type,
        options.kernel,
        features.len(),
        predictors.len()
    );
    let fit = fit_ensemble(&features, &targets, spare_type, &grid, &config)
        .map_err(|e| name_groups(e, input.groups.as_ref()))?;
    for note in fit.folds.iter().flat_map(|f| &f.notes) {
        diagnostics.warn(note.clone());
    }

    let performance = match spare_type {
        SpareType::Classification => Performance::Auc(fit.performance()),
        SpareType::Regression => Performance::Mae(fit.performance()),
    };
    diagnostics.info(format!(
        "Cross-validated {} = {:.3}",
        performance.label(),
        performance.mean()
    ));

    let metadata = SpareMetadata {
        spare_type,
        kernel: options.kernel,
        n: data.n_rows(),
        age_range: age_range(&data)?,
        to_predict: to_predict.to_string(),
        predictors,
        pos_group: input.positive_group().map(str::to_string),
        categorical_var_map: encoded.map,
        performance,
        params: fit.optimal_params(),
        param_grid: grid,
        cv_results: cv_results(&data, to_predict, &fit)?,
        n_folds: options.folds,
        n_repeats: options.repeats,
        seed: options.seed,
        library_version: crate::VERSION.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let artifact = SpareModelArtifact {
        model: SpareEnsemble::from_fit(&fit, spare_type),
        metadata,
    };

    let saved_to = match &options.output_dir {
        Some(dir) => {
            let name = options
                .model_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| default_model_name(spare_type, to_predict));
            fs::create_dir_all(dir)?;
            let path = dir.join(model_file_name(&name));
            artifact.save_to_file(&path)?;
            diagnostics.info(format!("Model saved to {}", path.display()));
            Some(path)
        }
        None => None,
    };

    Ok(TrainOutcome {
        artifact,
        diagnostics,
        saved_to,
    })
}

/// Floored minimum and maximum age, ignoring missing ages
fn age_range(table: &TabularDataset) -> Result<[f64; 2]> {
    let ages: Vec<f64> = table
        .numeric_column(AGE_COLUMN)?
        .into_iter()
        .filter(|a| !a.is_nan())
        .collect();
    if ages.is_empty() {
        return Err(SpareError::EmptyDataset);
    }
    let min = ages.iter().copied().fold(f64::INFINITY, f64::min);
    let max = ages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok([min.floor(), max.floor()])
}

fn cv_results(table: &TabularDataset, to_predict: &str, fit: &EnsembleFit) -> Result<Vec<CvResult>> {
    let ids = table.require_column(ID_COLUMN)?;
    let ages = table.require_column(AGE_COLUMN)?;
    let sexes = table.column(SEX_COLUMN);
    let targets = table.require_column(to_predict)?;

    Ok((0..table.n_rows())
        .map(|i| CvResult {
            id: ids[i].clone(),
            age: ages[i].clone(),
            sex: sexes.map(|s| s[i].clone()).filter(|v| !v.is_missing()),
            target: targets[i].clone(),
            predicted: Some(fit.predicted[i]).filter(|p| !p.is_nan()),
        })
        .collect())
}

/// Report fold-size failures under the group name instead of its ±1 label
fn name_groups(err: SpareError, groups: Option<&[String; 2]>) -> SpareError {
    match (err, groups) {
        (
            SpareError::InsufficientGroupSize {
                group,
                count,
                minimum,
            },
            Some([negative, positive]),
        ) => {
            let group = match group.parse::<f64>() {
                Ok(label) if label > 0.0 => positive.clone(),
                Ok(_) => negative.clone(),
                Err(_) => group,
            };
            SpareError::InsufficientGroupSize {
                group,
                count,
                minimum,
            }
        }
        (err, _) => err,
    }
}

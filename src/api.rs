//! High-level API for SPARE models
//!
//! This module provides a builder-pattern trainer and a thin model wrapper
//! over the training and inference pipelines.

use crate::core::{OptimizerConfig, Result};
use crate::data::TabularDataset;
use crate::kernel::KernelType;
use crate::persistence::{SpareMetadata, SpareModelArtifact};
use crate::pipeline::{apply_model, spare_train, InferenceOutcome, TrainOutcome, TrainingOptions};
use crate::search::ParamGrid;
use std::path::{Path, PathBuf};

/// SPARE model trainer with builder pattern
#[derive(Debug, Clone, Default)]
pub struct SpareTrainer {
    options: TrainingOptions,
}

impl SpareTrainer {
    /// Create a trainer with a linear kernel and the default 5 x 5 ensemble
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the kernel family
    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.options.kernel = kernel;
        self
    }

    /// Set the group that receives positive scores (classification)
    pub fn with_positive_group(mut self, group: impl Into<String>) -> Self {
        self.options.pos_group = Some(group.into());
        self
    }

    /// Set the number of cross-validation folds per repeat
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.options.folds = folds;
        self
    }

    /// Set the number of shuffled cross-validation repeats
    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.options.repeats = repeats;
        self
    }

    /// Set the seed of fold assignment
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    /// Replace the default starting grid
    pub fn with_param_grid(mut self, grid: ParamGrid) -> Self {
        self.options.param_grid = Some(grid);
        self
    }

    /// Set solver settings
    pub fn with_optimizer(mut self, config: OptimizerConfig) -> Self {
        self.options.optimizer = config;
        self
    }

    /// Set the solver iteration limit
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.options.optimizer.max_iterations = max_iterations;
        self
    }

    /// Save the trained model into `dir`, optionally under a custom name
    pub fn save_to<P: Into<PathBuf>>(mut self, dir: P, model_name: Option<&str>) -> Self {
        self.options.output_dir = Some(dir.into());
        self.options.model_name = model_name.map(str::to_string);
        self
    }

    pub fn options(&self) -> &TrainingOptions {
        &self.options
    }

    /// Train on an in-memory table
    pub fn train(
        &self,
        table: &TabularDataset,
        predictors: &[String],
        to_predict: &str,
    ) -> Result<TrainOutcome> {
        spare_train(table, predictors, to_predict, &self.options)
    }

    /// Train from a CSV file
    pub fn train_from_csv<P: AsRef<Path>>(
        &self,
        path: P,
        predictors: &[String],
        to_predict: &str,
    ) -> Result<TrainOutcome> {
        let table = TabularDataset::from_csv_path(path)?;
        self.train(&table, predictors, to_predict)
    }
}

/// Trained SPARE model ready for scoring
#[derive(Debug, Clone)]
pub struct SpareModel {
    artifact: SpareModelArtifact,
}

impl SpareModel {
    /// Load a saved model
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            artifact: SpareModelArtifact::load_from_file(path)?,
        })
    }

    /// Score a table
    pub fn score(&self, table: &TabularDataset) -> Result<InferenceOutcome> {
        apply_model(table, &self.artifact)
    }

    /// Score a CSV file
    pub fn score_csv<P: AsRef<Path>>(&self, path: P) -> Result<InferenceOutcome> {
        self.score(&TabularDataset::from_csv_path(path)?)
    }

    /// Save the model
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.artifact.save_to_file(path)
    }

    pub fn metadata(&self) -> &SpareMetadata {
        &self.artifact.metadata
    }

    pub fn artifact(&self) -> &SpareModelArtifact {
        &self.artifact
    }
}

impl From<SpareModelArtifact> for SpareModel {
    fn from(artifact: SpareModelArtifact) -> Self {
        Self { artifact }
    }
}

impl From<TrainOutcome> for SpareModel {
    fn from(outcome: TrainOutcome) -> Self {
        Self {
            artifact: outcome.artifact,
        }
    }
}

/// Convenience functions for quick operations
pub mod quick {
    use super::*;
    use crate::pipeline::spare_test;

    /// Train a linear model from a CSV file with default settings
    pub fn train_csv<P: AsRef<Path>>(
        path: P,
        predictors: &[String],
        to_predict: &str,
        pos_group: Option<&str>,
    ) -> Result<TrainOutcome> {
        let mut trainer = SpareTrainer::new();
        if let Some(group) = pos_group {
            trainer = trainer.with_positive_group(group);
        }
        trainer.train_from_csv(path, predictors, to_predict)
    }

    /// Score a CSV file with a saved model, optionally writing the scores
    pub fn test_csv<P1: AsRef<Path>, P2: AsRef<Path>>(
        data_path: P1,
        model_path: P2,
        out_dir: Option<&Path>,
    ) -> Result<InferenceOutcome> {
        let table = TabularDataset::from_csv_path(data_path)?;
        spare_test(&table, model_path, out_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SpareType;
    use crate::data::Value;
    use crate::search::ParamName;
    use tempfile::TempDir;

    fn regression_table(n: usize) -> TabularDataset {
        let rows = (0..n)
            .map(|i| {
                let x = i as f64;
                vec![
                    Value::Text(format!("sub{i:03}")),
                    Value::Number(55.0 + (i % 30) as f64),
                    Value::Number(x / 10.0),
                    Value::Number(((i * 7) % 11) as f64),
                    Value::Number(20.0 + x / 2.0),
                ]
            })
            .collect();
        TabularDataset::new(
            ["PTID", "Age", "ROI_1", "ROI_2", "Score"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_trainer_builder() {
        let trainer = SpareTrainer::new()
            .with_kernel(KernelType::Rbf)
            .with_positive_group("AD")
            .with_folds(3)
            .with_repeats(2)
            .with_seed(7)
            .with_max_iterations(500)
            .save_to("/tmp/models", Some("custom"));

        let options = trainer.options();
        assert_eq!(options.kernel, KernelType::Rbf);
        assert_eq!(options.pos_group.as_deref(), Some("AD"));
        assert_eq!(options.folds, 3);
        assert_eq!(options.repeats, 2);
        assert_eq!(options.seed, 7);
        assert_eq!(options.optimizer.max_iterations, 500);
        assert_eq!(options.output_dir, Some(PathBuf::from("/tmp/models")));
        assert_eq!(options.model_name.as_deref(), Some("custom"));
    }

    #[test]
    fn test_trainer_defaults() {
        let options = SpareTrainer::new().options().clone();
        assert_eq!(options, TrainingOptions::default());
        assert_eq!(options.folds * options.repeats, 25);
        assert!(options.output_dir.is_none());
    }

    #[test]
    fn test_train_save_load_score() {
        let table = regression_table(40);
        let dir = TempDir::new().expect("Failed to create temp dir");
        let trainer = SpareTrainer::new()
            .with_repeats(1)
            .with_param_grid(
                ParamGrid::new()
                    .with(ParamName::C, vec![1.0, 10.0])
                    .with(ParamName::Epsilon, vec![0.5]),
            )
            .save_to(dir.path(), None);

        let outcome = trainer
            .train(&table, &["ROI_1".to_string(), "ROI_2".to_string()], "Score")
            .expect("Training should succeed");
        assert_eq!(outcome.artifact.metadata.spare_type, SpareType::Regression);
        let path = outcome.saved_to.clone().expect("model should be saved");
        assert!(path.ends_with("mdl_SPARE_regression_Score.json.gz"));

        let model = SpareModel::load(&path).expect("Loading should succeed");
        assert_eq!(model.metadata(), &outcome.artifact.metadata);

        let in_memory = SpareModel::from(outcome);
        let a = in_memory.score(&table).unwrap();
        let b = model.score(&table).unwrap();
        assert_eq!(a.scores.len(), 40);
        for (x, y) in a.scores.iter().zip(&b.scores) {
            assert!(x == y || (x.is_nan() && y.is_nan()));
        }
    }
}

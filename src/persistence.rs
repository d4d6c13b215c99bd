//! Model artifact serialization and persistence
//!
//! A trained SPARE model is stored as one gzip-compressed JSON document holding
//! the per-fold ensemble and its metadata. Artifacts are checked for internal
//! consistency when loaded so inference never runs on a malformed bundle.

use crate::bias::BiasCorrection;
use crate::core::{Result, SpareError, SpareType};
use crate::data::Value;
use crate::encoding::CategoricalMap;
use crate::ensemble::{EnsembleFit, FoldPartition};
use crate::kernel::{KernelKind, KernelType};
use crate::optimizer::TrainedSVM;
use crate::search::{HyperParams, ParamGrid};
use crate::utils::scaling::StandardScaler;
use crate::utils::stats::nan_mean;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Fitted scalers and models, one per fold, with the fold partitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpareEnsemble {
    pub scalers: Vec<StandardScaler>,
    pub models: Vec<TrainedSVM>,
    /// Row indices into the cross-validation results
    pub cv_folds: Vec<FoldPartition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_correct: Option<Vec<BiasCorrection>>,
}

impl SpareEnsemble {
    pub fn from_fit(fit: &EnsembleFit, spare_type: SpareType) -> Self {
        Self {
            scalers: fit.folds.iter().map(|f| f.scaler.clone()).collect(),
            models: fit.folds.iter().map(|f| f.model.clone()).collect(),
            cv_folds: fit.folds.iter().map(|f| f.partition.clone()).collect(),
            bias_correct: match spare_type {
                SpareType::Classification => None,
                SpareType::Regression => Some(
                    fit.folds
                        .iter()
                        .map(|f| f.bias.unwrap_or(BiasCorrection::IDENTITY))
                        .collect(),
                ),
            },
        }
    }

    /// Number of fold models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Cross-validated performance, one entry per fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Auc(Vec<f64>),
    Mae(Vec<f64>),
}

impl Performance {
    pub fn values(&self) -> &[f64] {
        match self {
            Performance::Auc(v) | Performance::Mae(v) => v,
        }
    }

    pub fn mean(&self) -> f64 {
        nan_mean(self.values())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Performance::Auc(_) => "AUC",
            Performance::Mae(_) => "MAE",
        }
    }
}

/// One training row's out-of-fold result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    #[serde(rename = "PTID")]
    pub id: Value,
    #[serde(rename = "Age")]
    pub age: Value,
    #[serde(rename = "Sex", default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Value>,
    pub target: Value,
    pub predicted: Option<f64>,
}

/// Everything recorded about a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpareMetadata {
    pub spare_type: SpareType,
    pub kernel: KernelType,
    /// Training rows after filtering
    pub n: usize,
    /// Floored minimum and maximum training age
    pub age_range: [f64; 2],
    pub to_predict: String,
    pub predictors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_group: Option<String>,
    pub categorical_var_map: CategoricalMap,
    pub performance: Performance,
    /// Selected hyperparameters per fold
    pub params: Vec<HyperParams>,
    /// Grid searched by the final fit
    pub param_grid: ParamGrid,
    pub cv_results: Vec<CvResult>,
    pub n_folds: usize,
    pub n_repeats: usize,
    pub seed: u64,
    pub library_version: String,
    pub created_at: String,
}

impl SpareMetadata {
    /// Text form of every training identifier
    pub fn training_ids(&self) -> HashSet<String> {
        self.cv_results.iter().map(|r| r.id.key()).collect()
    }

    /// Identifiers of the training rows of one fold
    pub fn fold_training_ids(&self, partition: &FoldPartition) -> HashSet<String> {
        partition
            .train
            .iter()
            .filter_map(|&i| self.cv_results.get(i))
            .map(|r| r.id.key())
            .collect()
    }
}

/// Trained SPARE model: ensemble plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpareModelArtifact {
    pub model: SpareEnsemble,
    pub metadata: SpareMetadata,
}

impl SpareModelArtifact {
    /// Save to a gzip-compressed JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, self)
            .map_err(|e| SpareError::SerializationError(e.to_string()))?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Load from a file written by [`save_to_file`](Self::save_to_file)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let decoder = GzDecoder::new(BufReader::new(file));
        let artifact: Self = serde_json::from_reader(decoder)
            .map_err(|e| SpareError::SerializationError(e.to_string()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check that ensemble and metadata agree with each other
    pub fn validate(&self) -> Result<()> {
        let meta = &self.metadata;
        let ensemble = &self.model;
        let n_models = ensemble.len();
        let invalid = |msg: String| Err(SpareError::InvalidArtifact(msg));

        if n_models == 0 {
            return invalid("ensemble has no models".to_string());
        }
        if ensemble.scalers.len() != n_models || ensemble.cv_folds.len() != n_models {
            return invalid(format!(
                "ensemble has {} models, {} scalers and {} folds",
                n_models,
                ensemble.scalers.len(),
                ensemble.cv_folds.len()
            ));
        }
        match (meta.spare_type, &ensemble.bias_correct) {
            (SpareType::Regression, Some(bias)) if bias.len() == n_models => {}
            (SpareType::Regression, _) => {
                return invalid("regression model needs one bias correction per fold".to_string())
            }
            (SpareType::Classification, None) => {}
            (SpareType::Classification, Some(_)) => {
                return invalid("classification model carries bias correction".to_string())
            }
        }
        if meta.predictors.is_empty() {
            return invalid("no predictors recorded".to_string());
        }
        if meta.predictors.contains(&meta.to_predict) {
            return invalid(format!(
                "predictors include the variable to predict \"{}\"",
                meta.to_predict
            ));
        }

        let dim = meta.predictors.len();
        for (scaler, model) in ensemble.scalers.iter().zip(&ensemble.models) {
            if scaler.dim() != dim {
                return invalid(format!("scaler fitted on {} columns, expected {dim}", scaler.dim()));
            }
            if let KernelKind::Rbf { gamma } = model.kernel() {
                if !(gamma.is_finite() && gamma > 0.0) {
                    return invalid(format!("invalid RBF gamma {gamma}"));
                }
            }
            if model.kernel().kernel_type() != meta.kernel {
                return invalid("fold model kernel differs from recorded kernel".to_string());
            }
            let widths_ok = match model.weights() {
                Some(w) => w.len() == dim,
                None => model.support_vectors().iter().all(|sv| sv.len() == dim),
            };
            if !widths_ok {
                return invalid(format!("fold model does not have {dim} features"));
            }
        }
        let n_rows = meta.cv_results.len();
        if ensemble
            .cv_folds
            .iter()
            .flat_map(|p| p.train.iter().chain(&p.held_out))
            .any(|&i| i >= n_rows)
        {
            return invalid("fold indices exceed cross-validation results".to_string());
        }
        Ok(())
    }

    /// Print model summary
    pub fn print_summary(&self) {
        let meta = &self.metadata;
        println!("=== SPARE Model Summary ===");
        println!("Type: {}", meta.spare_type);
        println!("Kernel: {}", meta.kernel);
        println!("Variable to predict: {}", meta.to_predict);
        if let Some(group) = &meta.pos_group {
            println!("Positive group: {group}");
        }
        println!("Training N: {}", meta.n);
        println!("Ages: {} - {}", meta.age_range[0], meta.age_range[1]);
        println!("Predictors ({}): {}", meta.predictors.len(), meta.predictors.join(", "));
        for (name, coding) in &meta.categorical_var_map {
            match coding {
                Some(c) => println!("  {name}: {} -> 1, {} -> 2", c.levels()[0], c.levels()[1]),
                None => println!("  {name}: not encoded"),
            }
        }
        println!(
            "Ensemble: {} models ({} folds x {} repeats, seed {})",
            self.model.len(),
            meta.n_folds,
            meta.n_repeats,
            meta.seed
        );
        println!(
            "Expected {}: {:.3}",
            meta.performance.label(),
            meta.performance.mean()
        );
        println!("Library Version: {}", meta.library_version);
        println!("Created: {}", meta.created_at);
    }
}

/// `SPARE_<type>_<to_predict>` with dots replaced by underscores
pub fn default_model_name(spare_type: SpareType, to_predict: &str) -> String {
    format!("SPARE_{}_{}", spare_type, to_predict.replace('.', "_"))
}

/// File name under which a named model is saved
pub fn model_file_name(model_name: &str) -> String {
    format!("mdl_{model_name}.json.gz")
}

/// Model file name up to its first dot, used to name score outputs
pub fn model_stem<P: AsRef<Path>>(path: P) -> String {
    let name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Sample, SvmMode};
    use crate::encoding::BinaryCoding;
    use crate::optimizer::SVMOptimizer;
    use crate::search::ParamName;
    use tempfile::TempDir;

    fn tiny_artifact(spare_type: SpareType) -> SpareModelArtifact {
        let samples = vec![
            Sample::new(vec![1.0, 0.0], 1.0),
            Sample::new(vec![-1.0, 0.0], -1.0),
        ];
        let model = SVMOptimizer::with_kernel(KernelKind::Linear)
            .train_samples(&samples, SvmMode::Classification)
            .unwrap();
        let scaler = StandardScaler::fit(&[vec![1.0, 0.0], vec![-1.0, 0.0]]);

        let mut categorical_var_map = CategoricalMap::new();
        categorical_var_map.insert("Sex".into(), Some(BinaryCoding::new("M", "F")));

        SpareModelArtifact {
            model: SpareEnsemble {
                scalers: vec![scaler],
                models: vec![model],
                cv_folds: vec![FoldPartition {
                    train: vec![0],
                    held_out: vec![1],
                }],
                bias_correct: match spare_type {
                    SpareType::Classification => None,
                    SpareType::Regression => Some(vec![BiasCorrection::IDENTITY]),
                },
            },
            metadata: SpareMetadata {
                spare_type,
                kernel: KernelType::Linear,
                n: 2,
                age_range: [60.0, 81.0],
                to_predict: "Dx".into(),
                predictors: vec!["ROI_1".into(), "Sex".into()],
                pos_group: Some("AD".into()),
                categorical_var_map,
                performance: Performance::Auc(vec![0.9]),
                params: vec![HyperParams::default().with(ParamName::C, 0.5)],
                param_grid: ParamGrid::new().with(ParamName::C, vec![0.5, 1.0]),
                cv_results: vec![
                    CvResult {
                        id: "s1".into(),
                        age: 60.5.into(),
                        sex: Some("M".into()),
                        target: "AD".into(),
                        predicted: Some(0.7),
                    },
                    CvResult {
                        id: "s2".into(),
                        age: 81.0.into(),
                        sex: None,
                        target: "CN".into(),
                        predicted: None,
                    },
                ],
                n_folds: 1,
                n_repeats: 1,
                seed: 2022,
                library_version: crate::VERSION.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    #[test]
    fn test_model_names() {
        assert_eq!(
            default_model_name(SpareType::Regression, "Brain.Age"),
            "SPARE_regression_Brain_Age"
        );
        assert_eq!(model_file_name("SPARE_x"), "mdl_SPARE_x.json.gz");
        assert_eq!(model_stem("/tmp/out/mdl_SPARE_x.json.gz"), "mdl_SPARE_x");
    }

    #[test]
    fn test_artifact_roundtrip() -> Result<()> {
        let artifact = tiny_artifact(SpareType::Classification);
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join(model_file_name("test"));

        artifact.save_to_file(&path)?;
        let loaded = SpareModelArtifact::load_from_file(&path)?;

        assert_eq!(loaded, artifact);
        assert_eq!(loaded.metadata.cv_results[1].predicted, None);
        assert!(loaded.metadata.training_ids().contains("s2"));
        Ok(())
    }

    #[test]
    fn test_saved_file_is_gzip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json.gz");
        tiny_artifact(SpareType::Classification)
            .save_to_file(&path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_fold_training_ids() {
        let artifact = tiny_artifact(SpareType::Classification);
        let ids = artifact
            .metadata
            .fold_training_ids(&artifact.model.cv_folds[0]);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("s1"));
    }

    #[test]
    fn test_validate_rejects_inconsistent_bundles() {
        let mut artifact = tiny_artifact(SpareType::Classification);
        artifact.model.bias_correct = Some(vec![BiasCorrection::IDENTITY]);
        assert!(matches!(artifact.validate(), Err(SpareError::InvalidArtifact(_))));

        let mut artifact = tiny_artifact(SpareType::Regression);
        artifact.model.bias_correct = None;
        assert!(artifact.validate().is_err());

        let mut artifact = tiny_artifact(SpareType::Classification);
        artifact.metadata.predictors.push("Dx".into());
        assert!(artifact.validate().is_err());

        let mut artifact = tiny_artifact(SpareType::Classification);
        artifact.model.cv_folds[0].train = vec![5];
        assert!(artifact.validate().is_err());

        assert!(tiny_artifact(SpareType::Regression).validate().is_ok());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json.gz");
        std::fs::write(&path, b"not gzip").unwrap();
        assert!(matches!(
            SpareModelArtifact::load_from_file(&path),
            Err(SpareError::SerializationError(_))
        ));
    }

    #[test]
    fn test_performance_summary() {
        let perf = Performance::Mae(vec![2.0, 4.0]);
        assert_eq!(perf.mean(), 3.0);
        assert_eq!(perf.label(), "MAE");
        let json = serde_json::to_string(&perf).unwrap();
        assert_eq!(json, r#"{"mae":[2.0,4.0]}"#);
    }
}

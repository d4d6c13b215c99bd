//! SPARE scores: support vector ensembles for biomarker scoring
//!
//! A SPARE model summarizes how a set of tabular predictors relates to a
//! two-group label (classification) or a continuous outcome (regression). It
//! is an ensemble of per-fold SVMs from repeated k-fold cross-validation, each
//! with its own standardization and, for regression, bias correction. Scores
//! for a participant only come from folds that did not train on them.
//!
//! ```no_run
//! use spare_scores::{KernelType, SpareModel, SpareTrainer, TabularDataset};
//!
//! let table = TabularDataset::from_csv_path("cohort.csv")?;
//! let predictors = vec!["ROI_1".to_string(), "ROI_2".to_string()];
//! let outcome = SpareTrainer::new()
//!     .with_kernel(KernelType::Linear)
//!     .with_positive_group("AD")
//!     .save_to("models", None)
//!     .train(&table, &predictors, "Diagnosis")?;
//!
//! let model = SpareModel::from(outcome);
//! let scores = model.score(&TabularDataset::from_csv_path("new_cohort.csv")?)?;
//! println!("{:?}", scores.scores);
//! # Ok::<(), spare_scores::SpareError>(())
//! ```

pub mod api;
pub mod bias;
pub mod cache;
pub mod core;
pub mod data;
pub mod encoding;
pub mod ensemble;
pub mod kernel;
pub mod optimizer;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{SpareModel, SpareTrainer};
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::core::error::{Result, SpareError};
pub use crate::core::types::*;
pub use crate::data::{TabularDataset, Value};
pub use crate::kernel::{Kernel, KernelKind, KernelType, LinearKernel, RBFKernel};
pub use crate::optimizer::{SVMOptimizer, TrainedSVM};
pub use crate::persistence::{SpareMetadata, SpareModelArtifact};
pub use crate::pipeline::{spare_test, spare_train, InferenceOutcome, TrainOutcome, TrainingOptions};
pub use crate::report::Diagnostics;
pub use crate::search::{expspace, HyperParams, ParamGrid, ParamName};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

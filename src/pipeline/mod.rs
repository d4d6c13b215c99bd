//! End-to-end SPARE training and inference

pub mod infer;
pub mod train;
pub mod validation;

pub use self::infer::{apply_model, reconcile_predictors, spare_test, InferenceOutcome};
pub use self::train::{spare_train, TrainOutcome, TrainingOptions};
pub use self::validation::{validate_training_input, ValidatedInput};

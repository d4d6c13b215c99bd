//! Error types for SPARE training and inference

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpareError {
    #[error("Not all predictors exist in the input table: {0:?}")]
    MissingPredictors(Vec<String>),

    #[error("Required column \"{0}\" is missing from the input table")]
    MissingColumn(String),

    #[error("No predictors left after removing the variable to predict")]
    EmptyPredictors,

    #[error("Positive group not provided (group to assign a positive score)")]
    MissingPositiveGroup,

    #[error("Positive group \"{given}\" does not match one of the two groups: {observed:?}")]
    InvalidPositiveGroup { given: String, observed: Vec<String> },

    #[error("Group \"{group}\" is too small to classify (n={count} < {minimum})")]
    InsufficientGroupSize {
        group: String,
        count: usize,
        minimum: usize,
    },

    #[error("Variable to predict \"{column}\" must be either binary or numeric (found \"{value}\")")]
    NonNumericTarget { column: String, value: String },

    #[error("Sample size is too small (n={count} < {minimum})")]
    InsufficientSampleSize { count: usize, minimum: usize },

    #[error("Variable to predict \"{0}\" has no variance")]
    NoVariance(String),

    #[error("Column \"{column}\" contains value \"{value}\" other than expected: {expected:?}")]
    UnknownCategoricalValue {
        column: String,
        value: String,
        expected: Vec<String>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid label: expected -1 or +1, got {0}")]
    InvalidLabel(f64),

    #[error("Optimization failed: {0}")]
    OptimizationError(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, SpareError>;

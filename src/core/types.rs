//! Core type definitions shared by the solver, the ensemble and the pipelines

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of SPARE model, decided once from the variable to predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpareType {
    Classification,
    Regression,
}

impl fmt::Display for SpareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::Regression => write!(f, "regression"),
        }
    }
}

/// Training formulation handed to the solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SvmMode {
    /// Two-class C-SVC; targets must be +1 or -1
    Classification,
    /// Epsilon-insensitive support vector regression
    Regression { epsilon: f64 },
}

/// Training sample with dense features and its target
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Feature vector, one entry per predictor
    pub features: Vec<f64>,
    /// Class label (+1/-1) or regression target
    pub target: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(features: Vec<f64>, target: f64) -> Self {
        Self { features, target }
    }

    /// Number of features
    pub fn dim(&self) -> usize {
        self.features.len()
    }
}

/// Result of optimization process
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Expansion coefficient per training sample (alpha_i * y_i for SVC,
    /// alpha_i - alpha_i* for SVR)
    pub coefficients: Vec<f64>,
    /// Bias term (b), so that f(x) = sum_i coef_i K(x_i, x) + b
    pub b: f64,
    /// Indices of support vectors (non-zero coefficient)
    pub support_vectors: Vec<usize>,
    /// Number of iterations performed
    pub iterations: usize,
    /// Final dual objective value
    pub objective_value: f64,
}

/// Configuration for optimizer
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Stopping tolerance on the maximal KKT violation
    pub tolerance: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Kernel cache size in bytes
    pub cache_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            tolerance: 0.001,
            max_iterations: 100_000,
            cache_size: 100_000_000, // 100MB
        }
    }
}

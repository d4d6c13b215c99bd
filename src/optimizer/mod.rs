//! Optimization algorithms for SVM
//!
//! This module integrates kernels and the SMO solver into a fit primitive that
//! returns a self-contained, serializable model.

use crate::core::{OptimizerConfig, Result, Sample, SvmMode};
use crate::kernel::{dot, Kernel, KernelKind};
use crate::solver::SMOSolver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fit primitive: kernel plus solver configuration
#[derive(Debug, Clone)]
pub struct SVMOptimizer {
    kernel: KernelKind,
    config: OptimizerConfig,
}

impl SVMOptimizer {
    /// Create a new SVM optimizer with the given kernel and configuration
    pub fn new(kernel: KernelKind, config: OptimizerConfig) -> Self {
        Self { kernel, config }
    }

    /// Create a new SVM optimizer with default configuration
    pub fn with_kernel(kernel: KernelKind) -> Self {
        Self::new(kernel, OptimizerConfig::default())
    }

    /// Train an SVM model on a slice of samples
    pub fn train_samples(&self, samples: &[Sample], mode: SvmMode) -> Result<TrainedSVM> {
        let solver = SMOSolver::new(Arc::new(self.kernel), self.config.clone());
        let result = solver.solve(samples, mode)?;

        let n_support = result.support_vectors.len();
        let dual_coef: Vec<f64> = result
            .support_vectors
            .iter()
            .map(|&i| result.coefficients[i])
            .collect();

        // Linear models collapse into a weight vector; only RBF keeps the expansion
        let (weights, support_vectors) = match self.kernel {
            KernelKind::Linear => {
                let mut w = vec![0.0; samples[0].dim()];
                for (&i, &coef) in result.support_vectors.iter().zip(&dual_coef) {
                    for (wk, xk) in w.iter_mut().zip(&samples[i].features) {
                        *wk += coef * xk;
                    }
                }
                (Some(w), Vec::new())
            }
            KernelKind::Rbf { .. } => (
                None,
                result
                    .support_vectors
                    .iter()
                    .map(|&i| samples[i].features.clone())
                    .collect(),
            ),
        };

        Ok(TrainedSVM {
            kernel: self.kernel,
            weights,
            support_vectors,
            dual_coef: if matches!(self.kernel, KernelKind::Linear) {
                Vec::new()
            } else {
                dual_coef
            },
            intercept: result.b,
            n_support,
        })
    }

    /// Get the optimizer configuration
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Get the kernel
    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }
}

/// A trained SVM model that can compute decision values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedSVM {
    kernel: KernelKind,
    /// Primal weights, linear kernel only
    weights: Option<Vec<f64>>,
    /// Support vectors, non-linear kernels only
    support_vectors: Vec<Vec<f64>>,
    /// Expansion coefficients aligned with `support_vectors`
    dual_coef: Vec<f64>,
    intercept: f64,
    n_support: usize,
}

impl TrainedSVM {
    /// Get the decision function value for a feature vector
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        match &self.weights {
            Some(w) => dot(w, features) + self.intercept,
            None => {
                self.support_vectors
                    .iter()
                    .zip(&self.dual_coef)
                    .map(|(sv, coef)| coef * self.kernel.compute(sv, features))
                    .sum::<f64>()
                    + self.intercept
            }
        }
    }

    /// Coefficient vector of a linear model
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    /// Get the support vectors (empty for linear models)
    pub fn support_vectors(&self) -> &[Vec<f64>] {
        &self.support_vectors
    }

    /// Get the expansion coefficients for the support vectors
    pub fn dual_coefficients(&self) -> &[f64] {
        &self.dual_coef
    }

    /// Number of training samples with a non-zero coefficient
    ///
    /// Also counted for linear models, which do not keep the vectors.
    pub fn n_support_vectors(&self) -> usize {
        self.n_support
    }
}

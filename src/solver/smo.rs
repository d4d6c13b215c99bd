//! Sequential Minimal Optimization (SMO) solver implementation
//!
//! Solves the SVM dual in its generalized form
//!
//! ```text
//! min  0.5 aᵀQa + pᵀa   s.t.  yᵀa = 0,  0 <= a_t <= C
//! ```
//!
//! which covers both C-SVC (`Q_st = y_s y_t K_st`, `p = -1`) and epsilon-SVR
//! (two variables per sample, `p = eps ∓ z`). Working pairs are chosen by
//! maximal violation with second-order gain, and kernel rows come from an LRU
//! row cache.

use crate::cache::{KernelCache, KernelRow};
use crate::core::{OptimizationResult, OptimizerConfig, Result, Sample, SpareError, SvmMode};
use crate::kernel::{norm_squared, Kernel};
use log::{debug, warn};
use std::sync::Arc;

/// Replacement for non-positive curvature along the working pair
const TAU: f64 = 1e-12;

/// SMO solver for SVM optimization
///
/// Repeatedly optimizes pairs of Lagrange multipliers until the maximal KKT
/// violation drops below `config.tolerance`.
pub struct SMOSolver<K: Kernel> {
    kernel: Arc<K>,
    config: OptimizerConfig,
}

/// Dual variables of one problem instance
struct DualProblem {
    /// Sign of each dual variable
    y: Vec<f64>,
    /// Linear term of the objective
    p: Vec<f64>,
    /// Sample backing each dual variable
    sample_index: Vec<usize>,
}

impl DualProblem {
    fn build(samples: &[Sample], mode: SvmMode) -> Result<Self> {
        let n = samples.len();
        match mode {
            SvmMode::Classification => {
                if let Some(bad) = samples.iter().find(|s| s.target != 1.0 && s.target != -1.0) {
                    return Err(SpareError::InvalidLabel(bad.target));
                }
                let has_pos = samples.iter().any(|s| s.target > 0.0);
                let has_neg = samples.iter().any(|s| s.target < 0.0);
                if !(has_pos && has_neg) {
                    return Err(SpareError::InvalidParameter(
                        "classification needs samples from both classes".to_string(),
                    ));
                }
                Ok(Self {
                    y: samples.iter().map(|s| s.target).collect(),
                    p: vec![-1.0; n],
                    sample_index: (0..n).collect(),
                })
            }
            SvmMode::Regression { epsilon } => {
                if !(epsilon >= 0.0 && epsilon.is_finite()) {
                    return Err(SpareError::InvalidParameter(format!(
                        "epsilon must be non-negative, got: {epsilon}"
                    )));
                }
                let mut y = vec![1.0; n];
                y.extend(std::iter::repeat(-1.0).take(n));
                let mut p: Vec<f64> = samples.iter().map(|s| epsilon - s.target).collect();
                p.extend(samples.iter().map(|s| epsilon + s.target));
                Ok(Self {
                    y,
                    p,
                    sample_index: (0..n).chain(0..n).collect(),
                })
            }
        }
    }

    fn len(&self) -> usize {
        self.y.len()
    }
}

impl<K: Kernel> SMOSolver<K> {
    /// Create a new SMO solver with the given kernel and configuration
    pub fn new(kernel: Arc<K>, config: OptimizerConfig) -> Self {
        Self { kernel, config }
    }

    /// Solve the SVM optimization problem
    ///
    /// Returns one expansion coefficient per sample and the bias, such that
    /// `f(x) = Σ coef_i K(x_i, x) + b`.
    pub fn solve(&self, samples: &[Sample], mode: SvmMode) -> Result<OptimizationResult> {
        if samples.is_empty() {
            return Err(SpareError::EmptyDataset);
        }
        let dim = samples[0].dim();
        if let Some(bad) = samples.iter().find(|s| s.dim() != dim) {
            return Err(SpareError::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }
        if !(self.config.c > 0.0 && self.config.c.is_finite()) {
            return Err(SpareError::InvalidParameter(format!(
                "C must be positive, got: {}",
                self.config.c
            )));
        }

        let problem = DualProblem::build(samples, mode)?;
        let norms: Vec<f64> = samples.iter().map(|s| norm_squared(&s.features)).collect();
        let mut cache = KernelCache::with_memory_limit(self.config.cache_size, samples.len());

        let mut alpha = vec![0.0; problem.len()];
        let mut gradient = problem.p.clone();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            let Some((i, j)) =
                self.select_working_set(&problem, &alpha, &gradient, samples, &norms, &mut cache)
            else {
                converged = true;
                break;
            };
            iterations += 1;
            self.update_pair(i, j, &problem, &mut alpha, &mut gradient, samples, &norms, &mut cache);
        }

        if !converged {
            warn!(
                "SMO stopped after {} iterations without reaching tolerance {}",
                iterations, self.config.tolerance
            );
        }
        debug!(
            "SMO finished: {} iterations, cache hit rate {:.2}",
            iterations,
            cache.hit_rate()
        );

        let rho = self.calculate_rho(&problem, &alpha, &gradient);

        let n = samples.len();
        let mut coefficients = vec![0.0; n];
        for (t, &a) in alpha.iter().enumerate() {
            coefficients[problem.sample_index[t]] += problem.y[t] * a;
        }
        let support_vectors: Vec<usize> = coefficients
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| if c != 0.0 { Some(i) } else { None })
            .collect();

        // f(a) = 0.5 aᵀQa + pᵀa = 0.5 Σ a_t (G_t + p_t)
        let objective_value = 0.5
            * alpha
                .iter()
                .zip(gradient.iter().zip(&problem.p))
                .map(|(a, (g, p))| a * (g + p))
                .sum::<f64>();

        Ok(OptimizationResult {
            coefficients,
            b: -rho,
            support_vectors,
            iterations,
            objective_value,
        })
    }

    fn kernel_row(
        &self,
        sample: usize,
        samples: &[Sample],
        norms: &[f64],
        cache: &mut KernelCache,
    ) -> KernelRow {
        cache.get_or_compute(sample, || {
            let x = &samples[sample].features;
            samples
                .iter()
                .zip(norms)
                .map(|(other, &other_norm)| {
                    self.kernel
                        .compute_with_norms(x, &other.features, norms[sample], other_norm)
                })
                .collect()
        })
    }

    fn is_upper_bound(&self, a: f64) -> bool {
        a >= self.config.c
    }

    fn is_lower_bound(&self, a: f64) -> bool {
        a <= 0.0
    }

    /// Maximal-violating pair with second-order selection of the partner
    ///
    /// Returns `None` once the violation gap falls below the tolerance.
    fn select_working_set(
        &self,
        problem: &DualProblem,
        alpha: &[f64],
        gradient: &[f64],
        samples: &[Sample],
        norms: &[f64],
        cache: &mut KernelCache,
    ) -> Option<(usize, usize)> {
        let mut gmax = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..problem.len() {
            let y_t = problem.y[t];
            let movable = if y_t > 0.0 {
                !self.is_upper_bound(alpha[t])
            } else {
                !self.is_lower_bound(alpha[t])
            };
            if movable && -y_t * gradient[t] >= gmax {
                gmax = -y_t * gradient[t];
                i_sel = Some(t);
            }
        }
        let i = i_sel?;

        let row_i = self.kernel_row(problem.sample_index[i], samples, norms, cache);
        let k_ii = row_i[problem.sample_index[i]];

        let mut gmax2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut j_sel = None;
        for t in 0..problem.len() {
            let y_t = problem.y[t];
            let movable = if y_t > 0.0 {
                !self.is_lower_bound(alpha[t])
            } else {
                !self.is_upper_bound(alpha[t])
            };
            if !movable {
                continue;
            }
            let y_grad = y_t * gradient[t];
            gmax2 = gmax2.max(y_grad);

            let grad_diff = gmax + y_grad;
            if grad_diff > 0.0 {
                let s = problem.sample_index[t];
                let k_tt = norms_diag(&*self.kernel, samples, norms, s);
                let mut quad = k_ii + k_tt - 2.0 * row_i[s];
                if quad <= 0.0 {
                    quad = TAU;
                }
                let obj = -(grad_diff * grad_diff) / quad;
                if obj <= obj_min {
                    obj_min = obj;
                    j_sel = Some(t);
                }
            }
        }

        if gmax + gmax2 < self.config.tolerance {
            return None;
        }
        j_sel.map(|j| (i, j))
    }

    /// Analytic two-variable update with clipping to the box, then gradient refresh
    #[allow(clippy::too_many_arguments)]
    fn update_pair(
        &self,
        i: usize,
        j: usize,
        problem: &DualProblem,
        alpha: &mut [f64],
        gradient: &mut [f64],
        samples: &[Sample],
        norms: &[f64],
        cache: &mut KernelCache,
    ) {
        let c = self.config.c;
        let (si, sj) = (problem.sample_index[i], problem.sample_index[j]);
        let row_i = self.kernel_row(si, samples, norms, cache);
        let row_j = self.kernel_row(sj, samples, norms, cache);
        let (y_i, y_j) = (problem.y[i], problem.y[j]);

        let q_ii = row_i[si];
        let q_jj = row_j[sj];
        let q_ij = y_i * y_j * row_i[sj];

        let old_ai = alpha[i];
        let old_aj = alpha[j];
        let (mut ai, mut aj);

        if y_i != y_j {
            let mut quad = q_ii + q_jj + 2.0 * q_ij;
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (-gradient[i] - gradient[j]) / quad;
            let diff = old_ai - old_aj;
            ai = old_ai + delta;
            aj = old_aj + delta;

            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
        } else {
            let mut quad = q_ii + q_jj - 2.0 * q_ij;
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (gradient[i] - gradient[j]) / quad;
            let sum = old_ai + old_aj;
            ai = old_ai - delta;
            aj = old_aj + delta;

            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        alpha[i] = ai;
        alpha[j] = aj;

        let delta_i = ai - old_ai;
        let delta_j = aj - old_aj;
        for t in 0..problem.len() {
            let s = problem.sample_index[t];
            let y_t = problem.y[t];
            gradient[t] += y_t * (y_i * row_i[s] * delta_i + y_j * row_j[s] * delta_j);
        }
    }

    /// Offset of the decision function (f(x) = Σ coef K - rho)
    fn calculate_rho(&self, problem: &DualProblem, alpha: &[f64], gradient: &[f64]) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;

        for t in 0..problem.len() {
            let y_grad = problem.y[t] * gradient[t];
            if self.is_upper_bound(alpha[t]) {
                if problem.y[t] < 0.0 {
                    upper = upper.min(y_grad);
                } else {
                    lower = lower.max(y_grad);
                }
            } else if self.is_lower_bound(alpha[t]) {
                if problem.y[t] > 0.0 {
                    upper = upper.min(y_grad);
                } else {
                    lower = lower.max(y_grad);
                }
            } else {
                free_count += 1;
                free_sum += y_grad;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else if upper.is_finite() && lower.is_finite() {
            (upper + lower) / 2.0
        } else if upper.is_finite() {
            upper
        } else if lower.is_finite() {
            lower
        } else {
            0.0
        }
    }
}

fn norms_diag<K: Kernel>(kernel: &K, samples: &[Sample], norms: &[f64], s: usize) -> f64 {
    let x = &samples[s].features;
    kernel.compute_with_norms(x, x, norms[s], norms[s])
}

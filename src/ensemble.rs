//! Repeated k-fold ensemble training
//!
//! Every repeat reshuffles the rows with its own seed and splits them into
//! folds (stratified by class for classification). Each fold standardizes its
//! training rows, grid-searches the hyperparameters on its held-out rows and
//! keeps the best model. Folds are fitted in parallel and collected in order.

use crate::bias::BiasCorrection;
use crate::core::{OptimizerConfig, Result, Sample, SpareError, SpareType, SvmMode};
use crate::kernel::KernelType;
use crate::optimizer::{SVMOptimizer, TrainedSVM};
use crate::search::{HyperParams, ParamGrid};
use crate::utils::metrics::{mean_absolute_error, roc_auc};
use crate::utils::scaling::StandardScaler;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOLDS: usize = 5;
pub const DEFAULT_REPEATS: usize = 5;
pub const DEFAULT_SEED: u64 = 2022;
/// Epsilon used by regression models when the grid does not search it
pub const DEFAULT_EPSILON: f64 = 0.1;

/// Training and held-out row indices of one fold, both ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPartition {
    pub train: Vec<usize>,
    pub held_out: Vec<usize>,
}

/// Ensemble layout and solver settings
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    pub kernel: KernelType,
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
    /// Solver settings; `c` is overridden by each grid point
    pub optimizer: OptimizerConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            kernel: KernelType::Linear,
            folds: DEFAULT_FOLDS,
            repeats: DEFAULT_REPEATS,
            seed: DEFAULT_SEED,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl EnsembleConfig {
    pub fn n_models(&self) -> usize {
        self.folds * self.repeats
    }
}

/// Everything learned for one fold
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub partition: FoldPartition,
    pub scaler: StandardScaler,
    pub model: TrainedSVM,
    pub params: HyperParams,
    /// AUC (classification) or MAE (regression) on the held-out rows
    pub performance: f64,
    /// Held-out predictions aligned with `partition.held_out`, bias-corrected
    /// for regression
    pub held_out_predictions: Vec<f64>,
    pub bias: Option<BiasCorrection>,
    /// Non-fatal findings of this fold
    pub notes: Vec<String>,
}

/// Fitted ensemble with its out-of-fold predictions
#[derive(Debug, Clone)]
pub struct EnsembleFit {
    pub folds: Vec<FoldResult>,
    /// Mean held-out prediction per row, NaN for rows never held out
    pub predicted: Vec<f64>,
}

impl EnsembleFit {
    pub fn performance(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.performance).collect()
    }

    /// Selected hyperparameters per fold
    pub fn optimal_params(&self) -> Vec<HyperParams> {
        self.folds.iter().map(|f| f.params).collect()
    }
}

/// Repeated k-fold partitions of `targets`
///
/// Repeat `r` shuffles with `seed + r`. Stratified partitions deal each class
/// round-robin over the folds so every fold keeps the class proportions.
pub fn kfold_partitions(
    targets: &[f64],
    folds: usize,
    repeats: usize,
    seed: u64,
    stratified: bool,
) -> Result<Vec<FoldPartition>> {
    let n = targets.len();
    if folds < 2 {
        return Err(SpareError::InvalidParameter(format!(
            "at least 2 folds are required, got {folds}"
        )));
    }
    if repeats == 0 {
        return Err(SpareError::InvalidParameter(
            "at least 1 repeat is required".to_string(),
        ));
    }
    if n < folds {
        return Err(SpareError::InsufficientSampleSize {
            count: n,
            minimum: folds,
        });
    }

    let mut partitions = Vec::with_capacity(folds * repeats);
    for repeat in 0..repeats {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(repeat as u64));
        let mut assignment = vec![0usize; n];

        if stratified {
            let mut classes: Vec<f64> = Vec::new();
            for &t in targets {
                if !classes.contains(&t) {
                    classes.push(t);
                }
            }
            classes.sort_by(f64::total_cmp);

            let mut next_fold = 0;
            for class in classes {
                let mut members: Vec<usize> = (0..n).filter(|&i| targets[i] == class).collect();
                if members.len() < folds {
                    return Err(SpareError::InsufficientGroupSize {
                        group: class.to_string(),
                        count: members.len(),
                        minimum: folds,
                    });
                }
                members.shuffle(&mut rng);
                for i in members {
                    assignment[i] = next_fold;
                    next_fold = (next_fold + 1) % folds;
                }
            }
        } else {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);
            // first n % folds folds get one extra row
            let base = n / folds;
            let extra = n % folds;
            let mut start = 0;
            for fold in 0..folds {
                let size = base + usize::from(fold < extra);
                for &i in &order[start..start + size] {
                    assignment[i] = fold;
                }
                start += size;
            }
        }

        for fold in 0..folds {
            let (held_out, train): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|&i| assignment[i] == fold);
            partitions.push(FoldPartition { train, held_out });
        }
    }
    Ok(partitions)
}

/// Fit the full ensemble on a numeric feature matrix
///
/// `targets` are ±1 labels for classification and raw outcomes for regression.
pub fn fit_ensemble(
    features: &[Vec<f64>],
    targets: &[f64],
    spare_type: SpareType,
    grid: &ParamGrid,
    config: &EnsembleConfig,
) -> Result<EnsembleFit> {
    if features.is_empty() {
        return Err(SpareError::EmptyDataset);
    }
    if features.len() != targets.len() {
        return Err(SpareError::DimensionMismatch {
            expected: features.len(),
            actual: targets.len(),
        });
    }
    grid.validate(spare_type)?;

    let stratified = spare_type == SpareType::Classification;
    let partitions = kfold_partitions(targets, config.folds, config.repeats, config.seed, stratified)?;
    let candidates = grid.candidates();

    debug!(
        "Fitting {} folds over {} grid points on {} rows",
        partitions.len(),
        candidates.len(),
        features.len()
    );

    let folds: Vec<FoldResult> = partitions
        .into_par_iter()
        .map(|partition| fit_fold(features, targets, spare_type, &candidates, config, partition))
        .collect::<Result<Vec<_>>>()?;

    let mut sums = vec![0.0; features.len()];
    let mut counts = vec![0usize; features.len()];
    for fold in &folds {
        for (&row, &pred) in fold.partition.held_out.iter().zip(&fold.held_out_predictions) {
            sums[row] += pred;
            counts[row] += 1;
        }
    }
    let predicted = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect();

    Ok(EnsembleFit { folds, predicted })
}

fn fit_fold(
    features: &[Vec<f64>],
    targets: &[f64],
    spare_type: SpareType,
    candidates: &[HyperParams],
    config: &EnsembleConfig,
    partition: FoldPartition,
) -> Result<FoldResult> {
    let train_rows: Vec<Vec<f64>> = partition.train.iter().map(|&i| features[i].clone()).collect();
    let scaler = StandardScaler::fit(&train_rows);
    let samples: Vec<Sample> = partition
        .train
        .iter()
        .zip(scaler.transform_rows(&train_rows))
        .map(|(&i, x)| Sample::new(x, targets[i]))
        .collect();
    let held_out_x: Vec<Vec<f64>> = partition
        .held_out
        .iter()
        .map(|&i| scaler.transform(&features[i]))
        .collect();
    let held_out_y: Vec<f64> = partition.held_out.iter().map(|&i| targets[i]).collect();
    let dim = scaler.dim();

    let mut best: Option<(f64, HyperParams, TrainedSVM, Vec<f64>)> = None;
    for params in candidates {
        let optimizer = SVMOptimizer::new(
            params.kernel(config.kernel, dim),
            OptimizerConfig {
                c: params.c,
                ..config.optimizer.clone()
            },
        );
        let mode = match spare_type {
            SpareType::Classification => SvmMode::Classification,
            SpareType::Regression => SvmMode::Regression {
                epsilon: params.epsilon.unwrap_or(DEFAULT_EPSILON),
            },
        };
        let model = optimizer.train_samples(&samples, mode)?;
        let raw: Vec<f64> = held_out_x.iter().map(|x| model.decision_function(x)).collect();
        let score = match spare_type {
            SpareType::Classification => roc_auc(&held_out_y, &raw),
            SpareType::Regression => -mean_absolute_error(&held_out_y, &raw),
        };
        let score = if score.is_nan() { f64::NEG_INFINITY } else { score };
        if best.as_ref().map_or(true, |(s, ..)| score > *s) {
            best = Some((score, *params, model, raw));
        }
    }

    let (_, params, model, raw) = best.ok_or_else(|| {
        SpareError::InvalidParameter("parameter grid has no candidates".to_string())
    })?;

    let mut notes = Vec::new();
    let (predictions, bias, performance) = match spare_type {
        SpareType::Classification => {
            let auc = roc_auc(&held_out_y, &raw);
            (raw, None, auc)
        }
        SpareType::Regression => {
            let bias = BiasCorrection::fit(&held_out_y, &raw).unwrap_or_else(|| {
                notes.push(format!(
                    "Bias correction could not be fitted on a fold of {} held-out rows; using identity",
                    held_out_y.len()
                ));
                BiasCorrection::IDENTITY
            });
            let corrected = bias.apply_all(&raw);
            let mae = mean_absolute_error(&held_out_y, &corrected);
            (corrected, Some(bias), mae)
        }
    };

    debug!("Fold selected {} (performance {:.4})", params, performance);

    Ok(FoldResult {
        partition,
        scaler,
        model,
        params,
        performance,
        held_out_predictions: predictions,
        bias,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamName;
    use crate::utils::stats::nan_mean;

    fn labels(n_pos: usize, n_neg: usize) -> Vec<f64> {
        let mut y = vec![1.0; n_pos];
        y.extend(vec![-1.0; n_neg]);
        y
    }

    #[test]
    fn test_partitions_cover_every_row_once_per_repeat() {
        let y = labels(12, 18);
        let parts = kfold_partitions(&y, 5, 3, 7, true).unwrap();
        assert_eq!(parts.len(), 15);

        for repeat in parts.chunks(5) {
            let mut seen = vec![0; y.len()];
            for p in repeat {
                assert_eq!(p.train.len() + p.held_out.len(), y.len());
                for &i in &p.held_out {
                    seen[i] += 1;
                    assert!(!p.train.contains(&i));
                }
            }
            assert!(seen.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_stratified_partitions_keep_class_balance() {
        let y = labels(10, 40);
        let parts = kfold_partitions(&y, 5, 1, 1, true).unwrap();
        for p in &parts {
            let pos = p.held_out.iter().filter(|&&i| y[i] > 0.0).count();
            assert_eq!(pos, 2);
            assert_eq!(p.held_out.len(), 10);
        }
    }

    #[test]
    fn test_plain_partitions_sizes() {
        let y: Vec<f64> = (0..23).map(f64::from).collect();
        let parts = kfold_partitions(&y, 5, 1, 3, false).unwrap();
        let sizes: Vec<usize> = parts.iter().map(|p| p.held_out.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
    }

    #[test]
    fn test_partitions_are_seeded() {
        let y = labels(15, 15);
        let a = kfold_partitions(&y, 5, 2, 11, true).unwrap();
        let b = kfold_partitions(&y, 5, 2, 11, true).unwrap();
        assert_eq!(a, b);
        // repeats use different shuffles
        assert_ne!(a[0], a[5]);
    }

    #[test]
    fn test_partition_errors() {
        let y = labels(3, 20);
        assert!(matches!(
            kfold_partitions(&y, 5, 1, 0, true),
            Err(SpareError::InsufficientGroupSize { count: 3, .. })
        ));
        assert!(kfold_partitions(&y, 1, 1, 0, false).is_err());
        assert!(matches!(
            kfold_partitions(&labels(2, 1), 5, 1, 0, false),
            Err(SpareError::InsufficientSampleSize { .. })
        ));
    }

    fn separable_features(y: &[f64]) -> Vec<Vec<f64>> {
        y.iter()
            .enumerate()
            .map(|(i, &label)| {
                let jitter = (i % 7) as f64 * 0.1;
                vec![label * 2.0 + jitter, jitter - 0.3]
            })
            .collect()
    }

    #[test]
    fn test_classification_ensemble() {
        let y = labels(20, 20);
        let x = separable_features(&y);
        let grid = ParamGrid::new().with(ParamName::C, vec![0.1, 1.0]);
        let config = EnsembleConfig {
            repeats: 2,
            ..EnsembleConfig::default()
        };

        let fit = fit_ensemble(&x, &y, SpareType::Classification, &grid, &config).unwrap();
        assert_eq!(fit.folds.len(), config.n_models());
        assert!(fit.performance().iter().all(|&auc| auc == 1.0));
        assert!(fit.folds.iter().all(|f| f.bias.is_none()));
        for (pred, label) in fit.predicted.iter().zip(&y) {
            assert_eq!(pred.signum(), *label);
        }
    }

    #[test]
    fn test_regression_ensemble_applies_bias_correction() {
        let y: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let x: Vec<Vec<f64>> = y
            .iter()
            .enumerate()
            .map(|(i, &t)| vec![t / 10.0, ((i * 13) % 5) as f64])
            .collect();
        let grid = ParamGrid::new()
            .with(ParamName::C, vec![1.0, 10.0])
            .with(ParamName::Epsilon, vec![0.1]);
        let config = EnsembleConfig {
            repeats: 1,
            ..EnsembleConfig::default()
        };

        let fit = fit_ensemble(&x, &y, SpareType::Regression, &grid, &config).unwrap();
        assert_eq!(fit.folds.len(), 5);
        assert!(fit.folds.iter().all(|f| f.bias.is_some()));
        assert!(fit.predicted.iter().all(|p| p.is_finite()));
        assert!(nan_mean(&fit.performance()) < 5.0);
    }

    #[test]
    fn test_fit_ensemble_input_checks() {
        let grid = ParamGrid::new().with(ParamName::C, vec![1.0]);
        let config = EnsembleConfig::default();
        assert!(matches!(
            fit_ensemble(&[], &[], SpareType::Classification, &grid, &config),
            Err(SpareError::EmptyDataset)
        ));
        assert!(matches!(
            fit_ensemble(&[vec![1.0]], &[1.0, -1.0], SpareType::Classification, &grid, &config),
            Err(SpareError::DimensionMismatch { .. })
        ));
    }
}

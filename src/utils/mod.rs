//! Utility functions for SPARE model fitting

/// Feature scaling utilities
pub mod scaling {
    use serde::{Deserialize, Serialize};

    /// Standard (Z-score) scaler: (x - mean) / std
    ///
    /// Statistics come from the training rows of a fold only and use the
    /// population standard deviation. Constant columns get a scale of 1 so they
    /// map to zero instead of dividing by zero.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct StandardScaler {
        pub mean: Vec<f64>,
        pub scale: Vec<f64>,
    }

    impl StandardScaler {
        /// Compute scaling parameters from training rows
        pub fn fit(rows: &[Vec<f64>]) -> Self {
            let dim = rows.first().map_or(0, Vec::len);
            let n = rows.len().max(1) as f64;

            let mut mean = vec![0.0; dim];
            for row in rows {
                for (m, &v) in mean.iter_mut().zip(row) {
                    *m += v;
                }
            }
            mean.iter_mut().for_each(|m| *m /= n);

            let mut variance = vec![0.0; dim];
            for row in rows {
                for ((var, &m), &v) in variance.iter_mut().zip(&mean).zip(row) {
                    *var += (v - m).powi(2);
                }
            }
            let scale = variance
                .into_iter()
                .map(|var| {
                    let std = (var / n).sqrt();
                    if std < 1e-12 {
                        1.0
                    } else {
                        std
                    }
                })
                .collect();

            Self { mean, scale }
        }

        /// Transform a single row using fitted parameters
        pub fn transform(&self, row: &[f64]) -> Vec<f64> {
            row.iter()
                .zip(self.mean.iter().zip(&self.scale))
                .map(|(&v, (&m, &s))| (v - m) / s)
                .collect()
        }

        /// Transform multiple rows
        pub fn transform_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
            rows.iter().map(|row| self.transform(row)).collect()
        }

        /// Number of columns the scaler was fitted on
        pub fn dim(&self) -> usize {
            self.mean.len()
        }
    }
}

/// Performance metrics used for model selection and reporting
pub mod metrics {
    /// Area under the ROC curve for labels in {-1, +1}
    ///
    /// Computed from the Mann-Whitney rank statistic with tied scores sharing
    /// their average rank. Returns NaN when one class is absent.
    pub fn roc_auc(labels: &[f64], scores: &[f64]) -> f64 {
        let n_pos = labels.iter().filter(|&&l| l > 0.0).count();
        let n_neg = labels.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return f64::NAN;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut rank_sum_pos = 0.0;
        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && scores[order[end]] == scores[order[start]] {
                end += 1;
            }
            // ranks are 1-based: start+1 ..= end
            let avg_rank = (start + 1 + end) as f64 / 2.0;
            for &idx in &order[start..end] {
                if labels[idx] > 0.0 {
                    rank_sum_pos += avg_rank;
                }
            }
            start = end;
        }

        let n_pos = n_pos as f64;
        (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
    }

    /// Mean absolute error
    pub fn mean_absolute_error(targets: &[f64], predictions: &[f64]) -> f64 {
        if targets.is_empty() {
            return f64::NAN;
        }
        targets
            .iter()
            .zip(predictions)
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / targets.len() as f64
    }
}

/// Statistical utilities
pub mod stats {
    /// Mean of the finite values, NaN if there are none
    pub fn nan_mean(values: &[f64]) -> f64 {
        let (sum, count) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Arithmetic mean, NaN for an empty slice
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            f64::NAN
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Least-squares line `y ≈ slope * x + intercept`
    ///
    /// Returns `None` with fewer than two points or when `x` has no spread.
    pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
        if x.len() < 2 || x.len() != y.len() {
            return None;
        }
        let mx = mean(x);
        let my = mean(y);
        let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
        if sxx <= f64::EPSILON * x.len() as f64 {
            return None;
        }
        let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
        let slope = sxy / sxx;
        Some((slope, my - slope * mx))
    }
}

//! Per-fold recalibration of regression outputs into target units

use crate::utils::stats::linear_fit;
use serde::{Deserialize, Serialize};

/// Linear relation `raw ≈ slope * target + intercept`, inverted on apply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasCorrection {
    pub slope: f64,
    #[serde(rename = "int")]
    pub intercept: f64,
}

impl BiasCorrection {
    pub const IDENTITY: Self = Self {
        slope: 1.0,
        intercept: 0.0,
    };

    /// Least-squares fit of raw decision values against true targets
    ///
    /// Returns `None` when the relation cannot be inverted: fewer than two
    /// points, constant targets, or a non-finite or vanishing slope.
    pub fn fit(targets: &[f64], raw: &[f64]) -> Option<Self> {
        let (slope, intercept) = linear_fit(targets, raw)?;
        if !slope.is_finite() || !intercept.is_finite() || slope.abs() < 1e-8 {
            return None;
        }
        Some(Self { slope, intercept })
    }

    /// `(raw - intercept) / slope`
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.intercept) / self.slope
    }

    pub fn apply_all(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&r| self.apply(r)).collect()
    }
}

impl Default for BiasCorrection {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_recovers_shrinkage() {
        // decision values shrunk towards the mean: raw = 0.5 * y + 10
        let targets = [20.0, 40.0, 60.0, 80.0];
        let raw: Vec<f64> = targets.iter().map(|y| 0.5 * y + 10.0).collect();

        let correction = BiasCorrection::fit(&targets, &raw).unwrap();
        assert_relative_eq!(correction.slope, 0.5, epsilon = 1e-12);
        assert_relative_eq!(correction.intercept, 10.0, epsilon = 1e-10);

        let corrected = correction.apply_all(&raw);
        for (c, t) in corrected.iter().zip(&targets) {
            assert_relative_eq!(*c, *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_degenerate_fits() {
        assert!(BiasCorrection::fit(&[1.0], &[1.0]).is_none());
        assert!(BiasCorrection::fit(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).is_none());
        // raw values that ignore the target cannot be inverted
        assert!(BiasCorrection::fit(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]).is_none());
    }

    #[test]
    fn test_identity() {
        assert_eq!(BiasCorrection::default().apply(3.5), 3.5);
        let json = serde_json::to_string(&BiasCorrection::IDENTITY).unwrap();
        assert_eq!(json, r#"{"slope":1.0,"int":0.0}"#);
    }
}

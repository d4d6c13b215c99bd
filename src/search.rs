//! Hyperparameter grids and coarse-to-fine refinement
//!
//! Grids are exponential: a span `[lo, hi]` of integers expands to
//! `exp(lo), exp(lo + 1), ..., exp(hi)`. Large training sets first search a
//! seeded subsample with the coarse grid, and the per-fold optima of that run
//! bound the grid used for the full fit.

use crate::core::{Result, SpareError, SpareType};
use crate::kernel::{KernelKind, KernelType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Training sets larger than this are refined on a subsample first
pub const REFINEMENT_THRESHOLD: usize = 1000;
/// Rows drawn for the refinement run
pub const REFINEMENT_SAMPLE_SIZE: usize = 500;
/// Seed of the refinement subsample
pub const REFINEMENT_SEED: u64 = 2022;

/// `exp(linspace(lo, hi, hi - lo + 1))`; empty when `hi < lo`
pub fn expspace(lo: i32, hi: i32) -> Vec<f64> {
    (lo..=hi).map(|v| f64::from(v).exp()).collect()
}

/// Tunable SVM hyperparameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamName {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "gamma")]
    Gamma,
    #[serde(rename = "epsilon")]
    Epsilon,
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamName::C => write!(f, "C"),
            ParamName::Gamma => write!(f, "gamma"),
            ParamName::Epsilon => write!(f, "epsilon"),
        }
    }
}

/// Candidate values for one hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub name: ParamName,
    pub values: Vec<f64>,
}

/// Ordered hyperparameter grid
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<GridAxis>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an axis, keeping the original position on replace
    pub fn with(mut self, name: ParamName, values: Vec<f64>) -> Self {
        match self.axes.iter_mut().find(|axis| axis.name == name) {
            Some(axis) => axis.values = values,
            None => self.axes.push(GridAxis { name, values }),
        }
        self
    }

    /// Starting grid for a model type and kernel
    pub fn default_for(spare_type: SpareType, kernel: KernelType) -> Self {
        match (spare_type, kernel) {
            (SpareType::Classification, KernelType::Linear) => {
                Self::new().with(ParamName::C, expspace(-9, 5))
            }
            (SpareType::Classification, KernelType::Rbf) => Self::new()
                .with(ParamName::C, expspace(-9, 5))
                .with(ParamName::Gamma, expspace(-5, 5)),
            (SpareType::Regression, _) => Self::new()
                .with(ParamName::C, expspace(-5, 5))
                .with(ParamName::Epsilon, expspace(-5, 5)),
        }
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    pub fn values(&self, name: ParamName) -> Option<&[f64]> {
        self.axes
            .iter()
            .find(|axis| axis.name == name)
            .map(|axis| axis.values.as_slice())
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|axis| axis.values.len()).product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the grid can be searched for the given model type
    pub fn validate(&self, spare_type: SpareType) -> Result<()> {
        if self.values(ParamName::C).is_none() {
            return Err(SpareError::InvalidParameter(
                "parameter grid must contain C".to_string(),
            ));
        }
        if spare_type == SpareType::Classification && self.values(ParamName::Epsilon).is_some() {
            return Err(SpareError::InvalidParameter(
                "epsilon only applies to regression models".to_string(),
            ));
        }
        for axis in &self.axes {
            if axis.values.is_empty() {
                return Err(SpareError::InvalidParameter(format!(
                    "parameter grid for {} is empty",
                    axis.name
                )));
            }
            if let Some(bad) = axis.values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(SpareError::InvalidParameter(format!(
                    "invalid {} candidate: {}",
                    axis.name, bad
                )));
            }
            if axis.name != ParamName::Epsilon && axis.values.iter().any(|v| *v == 0.0) {
                return Err(SpareError::InvalidParameter(format!(
                    "{} candidates must be positive",
                    axis.name
                )));
            }
        }
        Ok(())
    }

    /// Every combination of axis values; the last axis varies fastest
    pub fn candidates(&self) -> Vec<HyperParams> {
        let mut points = vec![HyperParams::default()];
        for axis in &self.axes {
            points = points
                .iter()
                .flat_map(|point| axis.values.iter().map(move |&v| point.with(axis.name, v)))
                .collect();
        }
        if self.axes.is_empty() {
            Vec::new()
        } else {
            points
        }
    }

    /// Rebuild every axis from the natural log of per-fold optima
    ///
    /// Each axis becomes `expspace(floor(min ln), ceil(max ln))`. Axes without
    /// recorded optima are kept as they are.
    pub fn refine(&self, optima: &[HyperParams]) -> Self {
        let axes = self
            .axes
            .iter()
            .map(|axis| {
                let logs: Vec<f64> = optima
                    .iter()
                    .filter_map(|p| p.get(axis.name))
                    .filter(|v| *v > 0.0)
                    .map(|v| snap_to_integer(v.ln()))
                    .collect();
                if logs.is_empty() {
                    return axis.clone();
                }
                let lo = logs.iter().copied().fold(f64::INFINITY, f64::min).floor();
                let hi = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max).ceil();
                GridAxis {
                    name: axis.name,
                    values: expspace(lo as i32, hi as i32),
                }
            })
            .collect();
        Self { axes }
    }
}

/// Grid values are `exp` of integers; undo the rounding error of `ln(exp(k))`
fn snap_to_integer(x: f64) -> f64 {
    if (x - x.round()).abs() < 1e-9 {
        x.round()
    } else {
        x
    }
}

/// One point of the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            epsilon: None,
        }
    }
}

impl HyperParams {
    pub fn get(&self, name: ParamName) -> Option<f64> {
        match name {
            ParamName::C => Some(self.c),
            ParamName::Gamma => self.gamma,
            ParamName::Epsilon => self.epsilon,
        }
    }

    pub fn with(&self, name: ParamName, value: f64) -> Self {
        let mut next = *self;
        match name {
            ParamName::C => next.c = value,
            ParamName::Gamma => next.gamma = Some(value),
            ParamName::Epsilon => next.epsilon = Some(value),
        }
        next
    }

    /// Concrete kernel for these parameters
    ///
    /// An RBF kernel without a searched gamma uses `1 / n_features`, the usual
    /// default for standardized inputs.
    pub fn kernel(&self, kernel: KernelType, n_features: usize) -> KernelKind {
        match kernel {
            KernelType::Linear => KernelKind::Linear,
            KernelType::Rbf => KernelKind::Rbf {
                gamma: self
                    .gamma
                    .unwrap_or_else(|| 1.0 / n_features.max(1) as f64),
            },
        }
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C={:.4e}", self.c)?;
        if let Some(gamma) = self.gamma {
            write!(f, ", gamma={gamma:.4e}")?;
        }
        if let Some(epsilon) = self.epsilon {
            write!(f, ", epsilon={epsilon:.4e}")?;
        }
        Ok(())
    }
}

/// Seeded sample of `size` row indices out of `n`, in ascending order
pub fn subsample_indices(n: usize, size: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, n, size.min(n)).into_vec();
    picked.sort_unstable();
    picked
}

/// Seeded class-stratified sample of about `size` row indices, ascending
///
/// Each class keeps its share of the sample, but never fewer than
/// `min_per_class` rows, or all of its rows when it has fewer than that.
pub fn stratified_subsample_indices(
    labels: &[f64],
    size: usize,
    min_per_class: usize,
    seed: u64,
) -> Vec<usize> {
    let n = labels.len();
    if size >= n {
        return (0..n).collect();
    }
    let mut classes: Vec<f64> = Vec::new();
    for &label in labels {
        if !classes.contains(&label) {
            classes.push(label);
        }
    }
    classes.sort_by(f64::total_cmp);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = Vec::with_capacity(size);
    for class in classes {
        let members: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
        let share = (members.len() as f64 * size as f64 / n as f64).round() as usize;
        let quota = share.max(min_per_class).min(members.len());
        picked.extend(
            rand::seq::index::sample(&mut rng, members.len(), quota)
                .into_iter()
                .map(|k| members[k]),
        );
    }
    picked.sort_unstable();
    picked
}

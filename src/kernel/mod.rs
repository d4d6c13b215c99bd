//! Kernel functions for SVM

pub mod linear;
pub mod rbf;
pub mod traits;

pub use self::linear::*;
pub use self::rbf::*;
pub use self::traits::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kernel family requested by the caller, before gamma is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelType {
    Linear,
    Rbf,
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Rbf => write!(f, "rbf"),
        }
    }
}

impl FromStr for KernelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "rbf" => Ok(Self::Rbf),
            other => Err(format!("Unsupported kernel: {other}. Use 'linear' or 'rbf'")),
        }
    }
}

/// Fully specified kernel stored with a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KernelKind {
    Linear,
    Rbf { gamma: f64 },
}

impl KernelKind {
    pub fn kernel_type(&self) -> KernelType {
        match self {
            Self::Linear => KernelType::Linear,
            Self::Rbf { .. } => KernelType::Rbf,
        }
    }
}

impl Kernel for KernelKind {
    fn compute(&self, x: &[f64], y: &[f64]) -> f64 {
        match self {
            Self::Linear => LinearKernel.compute(x, y),
            Self::Rbf { gamma } => RBFKernel::new(*gamma).compute(x, y),
        }
    }

    fn compute_with_norms(&self, x: &[f64], y: &[f64], x_norm_sq: f64, y_norm_sq: f64) -> f64 {
        match self {
            Self::Linear => LinearKernel.compute(x, y),
            Self::Rbf { gamma } => {
                RBFKernel::new(*gamma).compute_with_norms(x, y, x_norm_sq, y_norm_sq)
            }
        }
    }
}

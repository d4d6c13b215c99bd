//! Linear kernel implementation

use crate::kernel::{dot, Kernel};

/// Linear kernel: K(x, y) = x^T * y
///
/// Models fitted with this kernel collapse their support-vector expansion into a
/// single weight vector, so scoring is a dot product plus intercept.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl LinearKernel {
    /// Create a new linear kernel
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for LinearKernel {
    fn compute(&self, x: &[f64], y: &[f64]) -> f64 {
        dot(x, y)
    }
}

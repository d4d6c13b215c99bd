//! SVM solver implementations
//!
//! This module implements the Sequential Minimal Optimization (SMO) algorithm
//! for the generalized SVM dual shared by C-SVC and epsilon-SVR.

pub mod smo;

pub use self::smo::*;

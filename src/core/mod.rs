//! Core types and errors for SPARE models

pub mod error;
pub mod types;

pub use self::error::*;
pub use self::types::*;

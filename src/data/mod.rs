//! Tabular data handling
//!
//! Cohort tables are column-oriented, hold mixed numeric/text cells and load
//! from and save to CSV.

pub mod csv;
pub mod table;

pub use self::csv::{write_scores, write_scores_csv, SCORE_COLUMN};
pub use self::table::{TabularDataset, Value, AGE_COLUMN, ID_COLUMN, SEX_COLUMN};

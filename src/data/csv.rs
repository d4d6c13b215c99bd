//! CSV input/output for tabular datasets
//!
//! The first record is always the header. Blank cells and common NA markers
//! load as missing values; every other cell is numeric when it parses as a
//! finite float and text otherwise.

use super::table::{TabularDataset, Value};
use crate::core::{Result, SpareError};
use ::csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Name of the score column written by inference
pub const SCORE_COLUMN: &str = "SPARE_scores";

impl TabularDataset {
    /// Load a table from a CSV file with a header row
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Load a table from any reader producing CSV text
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(SpareError::EmptyDataset);
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse).collect());
        }
        Self::new(columns, rows)
    }

    /// Write the table to a CSV file; missing cells are written blank
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_path(path)?;
        wtr.write_record(self.column_names())?;
        let columns: Vec<&[Value]> = self
            .column_names()
            .iter()
            .filter_map(|name| self.column(name))
            .collect();
        for row in 0..self.n_rows() {
            wtr.write_record(columns.iter().map(|col| col[row].to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Write per-row scores with a leading row-index column
///
/// NaN scores are written as blank cells.
pub fn write_scores<W: Write>(writer: W, scores: &[f64]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(["", SCORE_COLUMN])?;
    for (i, score) in scores.iter().enumerate() {
        let cell = if score.is_nan() {
            String::new()
        } else {
            score.to_string()
        };
        wtr.write_record([i.to_string(), cell])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write per-row scores to a file path
pub fn write_scores_csv<P: AsRef<Path>>(path: P, scores: &[f64]) -> Result<()> {
    write_scores(File::create(path)?, scores)
}

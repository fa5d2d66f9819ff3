//! Headerless numeric CSV reader for per-case, per-tree tables.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::IoError;

/// Reads a headerless CSV of finite floats into rows.
///
/// Used for the jackknife inputs: one row per case and one column per tree,
/// holding either per-tree predictions or in-bag counts. Whitespace around
/// cells is ignored and every row must have the same number of columns.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero rows |
/// | [`IoError::InconsistentRowLength`] | Row length differs from the first row |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
pub struct MatrixReader {
    path: PathBuf,
}

impl MatrixReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<Vec<f64>>, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if let Some(first) = rows.first()
                && record.len() != first.len()
            {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: first.len(),
                    got: record.len(),
                });
            }

            let values = record
                .iter()
                .enumerate()
                .map(|(col_index, raw)| {
                    raw.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| IoError::NonFiniteValue {
                            path: self.path.clone(),
                            row_index,
                            col_index,
                            raw: raw.to_string(),
                        })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            rows.push(values);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_rows = rows.len(),
            n_cols = rows.first().map_or(0, Vec::len),
            "matrix loaded"
        );

        Ok(rows)
    }
}

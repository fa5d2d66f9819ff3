//! I/O error types for sylva-io.

use std::path::PathBuf;

/// Errors from data loading, report writing, and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a libsvm line cannot be parsed.
    #[error("libsvm parse error in {path} at line {line}: {reason}")]
    LibSvmParse {
        /// Path to the libsvm file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Returned when the file contains zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the input file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the first row.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// Expected number of columns (from the first row).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a cell value is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column {col_index}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// Zero-based column index.
        col_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when the parsed columns do not form a valid feature matrix.
    #[error("invalid feature matrix from {path}")]
    InvalidMatrix {
        /// Path to the input file.
        path: PathBuf,
        /// Underlying validation error.
        source: sylva_forest::ForestError,
    },

    /// Returned when the parent directory of an output file cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an output file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a CSV report cannot be written.
    #[error("cannot write CSV report {path}")]
    CsvWrite {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a JSON report cannot be encoded.
    #[error("cannot encode JSON report {path}")]
    JsonEncode {
        /// Path of the report.
        path: PathBuf,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// Returned when the model file cannot be read.
    #[error("cannot read model from {path}")]
    ReadModel {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when bincode encoding of a model fails.
    #[error("cannot encode model")]
    SerializeModel {
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when bincode decoding of a model file fails.
    #[error("cannot decode model from {path}")]
    DeserializeModel {
        /// Path of the model file.
        path: PathBuf,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when a model file was written by an incompatible format version.
    #[error("model {path} has format version {found}, expected {expected}")]
    IncompatibleModelVersion {
        /// Version this build reads.
        expected: u32,
        /// Version found in the file.
        found: u32,
        /// Path of the model file.
        path: PathBuf,
    },
}

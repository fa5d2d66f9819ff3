//! Data loading, report writing and model persistence for sylva.

mod error;
mod libsvm;
mod matrix_reader;
mod store;
mod writer;

pub use error::IoError;
pub use libsvm::{DEFAULT_CATEGORICAL_MAX_LEVELS, LibSvmReader};
pub use matrix_reader::MatrixReader;
pub use store::{FORMAT_VERSION, ModelStore};
pub use writer::{ReportWriter, summary_json};

//! CSV and JSON report writers for forest outputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sylva_forest::{ForestResult, OobScore, Prediction, RandomForest, RankedFeature, Sampling};
use tracing::{debug, info, instrument};

use crate::IoError;

/// Writes one report file: PDP rows, jackknife estimates, predictions or a
/// growth summary.
///
/// Creates the parent directory on construction if it does not exist.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    /// Create a new writer targeting the given file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the parent directory cannot be created.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn new(path: &Path) -> Result<Self, IoError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| IoError::OutputDirCreate {
                path: dir.to_path_buf(),
                source: e,
            })?;
            debug!("output directory ready");
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Return the report path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write partial dependence rows as CSV.
    ///
    /// The header is the feature names followed by `prediction`; each row is
    /// the grid value(s) and the mean prediction.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(path = %self.path.display(), n_rows = rows.len()))]
    pub fn write_partial_dependence(
        &self,
        feature_names: &[&str],
        rows: &[Vec<f64>],
    ) -> Result<(), IoError> {
        let mut wtr = self.csv_writer()?;
        let header = feature_names.iter().copied().chain(["prediction"]);
        wtr.write_record(header).map_err(|e| self.csv_error(e))?;
        for row in rows {
            wtr.write_record(row.iter().map(f64::to_string))
                .map_err(|e| self.csv_error(e))?;
        }
        self.finish(wtr)?;

        info!(path = %self.path.display(), "partial dependence written");
        Ok(())
    }

    /// Write jackknife estimates as a `prediction,variance` CSV.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(path = %self.path.display(), n_cases = estimates.len()))]
    pub fn write_jackknife(&self, estimates: &[Prediction]) -> Result<(), IoError> {
        let mut wtr = self.csv_writer()?;
        for estimate in estimates {
            wtr.serialize(JackknifeRecord {
                prediction: estimate.value,
                variance: estimate.variance,
            })
            .map_err(|e| self.csv_error(e))?;
        }
        self.finish(wtr)?;

        info!(path = %self.path.display(), "jackknife estimates written");
        Ok(())
    }

    /// Write one prediction per row as CSV.
    ///
    /// Columns are `row`, `prediction` and `label`; the label is the class
    /// name for a categorical target and empty for a numeric one.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(path = %self.path.display(), n_rows = predictions.len()))]
    pub fn write_predictions(
        &self,
        forest: &RandomForest,
        predictions: &[f64],
    ) -> Result<(), IoError> {
        let mut wtr = self.csv_writer()?;
        for (row, &prediction) in predictions.iter().enumerate() {
            let label = if forest.is_classification() {
                forest.class_label(prediction as usize)
            } else {
                None
            };
            wtr.serialize(PredictionRecord {
                row,
                prediction,
                label,
            })
            .map_err(|e| self.csv_error(e))?;
        }
        self.finish(wtr)?;

        info!(path = %self.path.display(), "predictions written");
        Ok(())
    }

    /// Write a growth summary as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::JsonEncode`] | The summary cannot be encoded |
    /// | [`IoError::WriteFile`] | The file cannot be written |
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn write_summary(&self, result: &ForestResult) -> Result<(), IoError> {
        let json = summary_json(result).map_err(|e| IoError::JsonEncode {
            path: self.path.clone(),
            source: e,
        })?;
        fs::write(&self.path, &json).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })?;

        info!(path = %self.path.display(), "growth summary written");
        Ok(())
    }

    fn csv_writer(&self) -> Result<csv::Writer<fs::File>, IoError> {
        csv::Writer::from_path(&self.path).map_err(|e| self.csv_error(e))
    }

    fn finish(&self, mut wtr: csv::Writer<fs::File>) -> Result<(), IoError> {
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }

    fn csv_error(&self, source: csv::Error) -> IoError {
        IoError::CsvWrite {
            path: self.path.clone(),
            source,
        }
    }
}

/// Render the growth summary of `result` as pretty-printed JSON.
///
/// # Errors
///
/// Returns the encoder error; the summary holds only plain data, so this
/// happens only for non-string map keys, which it has none of.
pub fn summary_json(result: &ForestResult) -> Result<String, serde_json::Error> {
    let forest = result.forest();
    let metadata = result.metadata();
    let artifact = SummaryArtifact {
        target: &forest.target().name,
        n_trees: metadata.n_trees,
        n_rows: metadata.n_rows,
        n_predictors: metadata.n_predictors,
        n_classes: metadata.n_classes,
        classes: &forest.target().levels,
        n_samples: metadata.n_samples,
        m_try: metadata.m_try,
        leaf_size: metadata.leaf_size,
        sampling: metadata.sampling,
        oob: result.oob_score().map(|score| OobEntry {
            error: score.error(),
            score,
        }),
        importances: result.importances(),
    };
    serde_json::to_string_pretty(&artifact)
}

// ---------------------------------------------------------------------------
// Serialization shadow structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JackknifeRecord {
    prediction: f64,
    variance: f64,
}

#[derive(Serialize)]
struct PredictionRecord<'a> {
    row: usize,
    prediction: f64,
    label: Option<&'a str>,
}

#[derive(Serialize)]
struct SummaryArtifact<'a> {
    target: &'a str,
    n_trees: usize,
    n_rows: usize,
    n_predictors: usize,
    n_classes: usize,
    classes: &'a [String],
    n_samples: usize,
    m_try: usize,
    leaf_size: usize,
    sampling: Sampling,
    oob: Option<OobEntry<'a>>,
    importances: &'a [RankedFeature],
}

#[derive(Serialize)]
struct OobEntry<'a> {
    error: f64,
    #[serde(flatten)]
    score: &'a OobScore,
}

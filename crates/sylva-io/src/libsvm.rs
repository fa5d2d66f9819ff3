//! libsvm text reader producing a [`FeatureMatrix`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use sylva_forest::{Feature, FeatureKind, FeatureMatrix};
use tracing::{debug, info, instrument};

use crate::IoError;

/// Default distinct-value limit for treating an integer column as categorical.
pub const DEFAULT_CATEGORICAL_MAX_LEVELS: usize = 10;

/// Reads a sparse libsvm file into a dense feature matrix.
///
/// Each non-blank line is `label idx:val idx:val ...` with one-based feature
/// indices. Lines starting with `#` are skipped. The label becomes column
/// `"0"` and feature `j` becomes column `"j"`; entries absent from a line
/// read as 0.
///
/// A column whose values are all integers with at most
/// `categorical_max_levels` distinct values is categorical, with levels
/// labelled by the integer text in ascending order. Other columns are
/// numeric. Explicit kinds set with [`LibSvmReader::with_column_kind`]
/// override the inference.
///
/// A sparse file only mentions the indices it uses, so a test file may lack
/// columns its training file had. [`LibSvmReader::with_min_index`] makes every
/// column up to the given index present, filled with 0 where absent.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::LibSvmParse`] | Malformed label, index or value |
/// | [`IoError::EmptyDataset`] | No data lines |
/// | [`IoError::InvalidMatrix`] | Columns fail feature matrix validation |
pub struct LibSvmReader {
    path: PathBuf,
    categorical_max_levels: usize,
    column_kinds: HashMap<String, FeatureKind>,
    min_index: usize,
}

struct SparseRow {
    label: f64,
    entries: Vec<(usize, f64)>,
}

impl LibSvmReader {
    /// Create a new reader for the given libsvm file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            categorical_max_levels: DEFAULT_CATEGORICAL_MAX_LEVELS,
            column_kinds: HashMap::new(),
            min_index: 0,
        }
    }

    /// Set the distinct-value limit for categorical inference. Zero disables it.
    #[must_use]
    pub fn with_categorical_max_levels(mut self, categorical_max_levels: usize) -> Self {
        self.categorical_max_levels = categorical_max_levels;
        self
    }

    /// Force the kind of a named column instead of inferring it.
    #[must_use]
    pub fn with_column_kind(mut self, name: impl Into<String>, kind: FeatureKind) -> Self {
        self.column_kinds.insert(name.into(), kind);
        self
    }

    /// Include every column up to `index` even when no line mentions it.
    #[must_use]
    pub fn with_min_index(mut self, index: usize) -> Self {
        self.min_index = index;
        self
    }

    /// Return the categorical inference limit.
    #[must_use]
    pub fn categorical_max_levels(&self) -> usize {
        self.categorical_max_levels
    }

    /// Read and validate the file, returning a [`FeatureMatrix`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureMatrix, IoError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        let mut rows = Vec::new();
        let mut max_index = self.min_index;
        for (line_index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = self.parse_line(line, line_index + 1)?;
            if let Some(&(last, _)) = row.entries.last() {
                max_index = max_index.max(last);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        debug!(n_rows = rows.len(), max_index, "parsed libsvm lines");

        let mut columns = vec![vec![0.0f64; rows.len()]; max_index + 1];
        for (r, row) in rows.iter().enumerate() {
            columns[0][r] = row.label;
            for &(index, value) in &row.entries {
                columns[index][r] = value;
            }
        }

        let features: Vec<Feature> = columns
            .into_iter()
            .enumerate()
            .map(|(index, values)| self.build_feature(index.to_string(), values))
            .collect::<Result<_, _>>()?;
        let n_categorical = features.iter().filter(|f| f.is_categorical()).count();

        let matrix = FeatureMatrix::new(features).map_err(|e| IoError::InvalidMatrix {
            path: self.path.clone(),
            source: e,
        })?;

        info!(
            n_rows = matrix.n_rows(),
            n_columns = matrix.n_features(),
            n_categorical,
            "libsvm dataset loaded"
        );

        Ok(matrix)
    }

    fn parse_line(&self, line: &str, line_number: usize) -> Result<SparseRow, IoError> {
        let parse_error = |reason: String| IoError::LibSvmParse {
            path: self.path.clone(),
            line: line_number,
            reason,
        };

        let mut tokens = line.split_whitespace();
        let raw_label = tokens.next().unwrap_or_default();
        let label = parse_finite(raw_label)
            .ok_or_else(|| parse_error(format!("invalid label \"{raw_label}\"")))?;

        let mut entries: Vec<(usize, f64)> = Vec::new();
        for token in tokens {
            let (raw_index, raw_value) = token
                .split_once(':')
                .ok_or_else(|| parse_error(format!("expected index:value, got \"{token}\"")))?;
            let index: usize = raw_index
                .parse()
                .ok()
                .filter(|&i| i > 0)
                .ok_or_else(|| parse_error(format!("invalid feature index \"{raw_index}\"")))?;
            let value = parse_finite(raw_value)
                .ok_or_else(|| parse_error(format!("invalid value \"{raw_value}\"")))?;
            entries.push((index, value));
        }

        entries.sort_unstable_by_key(|&(index, _)| index);
        if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(parse_error(format!("feature index {} repeated", pair[0].0)));
        }

        Ok(SparseRow { label, entries })
    }

    fn build_feature(&self, name: String, values: Vec<f64>) -> Result<Feature, IoError> {
        let categorical_levels = match self.column_kinds.get(&name) {
            Some(FeatureKind::Numeric) => None,
            Some(FeatureKind::Categorical) => integer_levels(&values, usize::MAX),
            None => integer_levels(&values, self.categorical_max_levels),
        };

        let Some(levels) = categorical_levels else {
            return Ok(Feature::numeric(name, values));
        };
        let codes = values
            .iter()
            .map(|&v| levels.binary_search(&(v as i64)).unwrap_or_default())
            .collect();
        let labels = levels.iter().map(i64::to_string).collect();
        Feature::from_codes(name, codes, labels).map_err(|e| IoError::InvalidMatrix {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Sorted distinct integer values, or `None` if any value is fractional or
/// there are more than `max_levels` of them.
fn integer_levels(values: &[f64], max_levels: usize) -> Option<Vec<i64>> {
    if max_levels == 0 || values.iter().any(|v| v.fract() != 0.0) {
        return None;
    }
    let distinct: BTreeSet<i64> = values.iter().map(|&v| v as i64).collect();
    (distinct.len() <= max_levels).then(|| distinct.into_iter().collect())
}

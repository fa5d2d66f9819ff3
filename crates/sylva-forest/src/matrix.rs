//! Columnar storage of named numeric and categorical features.

use std::collections::HashMap;
use std::fmt;

use crate::error::ForestError;

/// Whether a feature is ordered real-valued or an unordered label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FeatureKind {
    /// Ordered, real-valued.
    Numeric,
    /// Unordered, finite label set stored as dense codes.
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Numeric => f.write_str("numeric"),
            FeatureKind::Categorical => f.write_str("categorical"),
        }
    }
}

#[derive(Debug, Clone)]
enum Column {
    Numeric(Vec<f64>),
    Categorical { codes: Vec<usize>, levels: Vec<String> },
}

/// A named column of numeric values or category codes.
///
/// Categorical columns store one code per row in `0..n_levels` plus the
/// level labels; [`Feature::value`] reports the code as `f64`.
#[derive(Debug, Clone)]
pub struct Feature {
    name: String,
    column: Column,
}

impl Feature {
    /// Create a numeric feature.
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            column: Column::Numeric(values),
        }
    }

    /// Create a categorical feature from per-row labels.
    ///
    /// Codes are assigned in order of first appearance.
    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, labels: &[S]) -> Self {
        let mut lookup: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<String> = Vec::new();
        let codes = labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                *lookup.entry(label).or_insert_with(|| {
                    levels.push(label.to_string());
                    levels.len() - 1
                })
            })
            .collect();
        Self {
            name: name.into(),
            column: Column::Categorical { codes, levels },
        }
    }

    /// Create a categorical feature from pre-computed codes and level labels.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidCategoryCode`] when a code is `>= levels.len()`.
    pub fn from_codes(
        name: impl Into<String>,
        codes: Vec<usize>,
        levels: Vec<String>,
    ) -> Result<Self, ForestError> {
        let name = name.into();
        if let Some((row, &code)) = codes.iter().enumerate().find(|&(_, &c)| c >= levels.len()) {
            return Err(ForestError::InvalidCategoryCode {
                name,
                row,
                code,
                n_levels: levels.len(),
            });
        }
        Ok(Self {
            name,
            column: Column::Categorical { codes, levels },
        })
    }

    /// Return the feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the feature kind.
    #[must_use]
    pub fn kind(&self) -> FeatureKind {
        match self.column {
            Column::Numeric(_) => FeatureKind::Numeric,
            Column::Categorical { .. } => FeatureKind::Categorical,
        }
    }

    /// Return `true` if this feature is categorical.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        self.kind() == FeatureKind::Categorical
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.column {
            Column::Numeric(values) => values.len(),
            Column::Categorical { codes, .. } => codes.len(),
        }
    }

    /// Return `true` if the feature has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the value at `row`: the number itself, or the category code as `f64`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`.
    #[must_use]
    pub fn value(&self, row: usize) -> f64 {
        match &self.column {
            Column::Numeric(values) => values[row],
            Column::Categorical { codes, .. } => codes[row] as f64,
        }
    }

    /// Return the category code at `row`, or `None` for numeric features.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`.
    #[must_use]
    pub fn code(&self, row: usize) -> Option<usize> {
        match &self.column {
            Column::Numeric(_) => None,
            Column::Categorical { codes, .. } => Some(codes[row]),
        }
    }

    /// Return the string representation at `row`: the formatted number, or the level label.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`.
    #[must_use]
    pub fn str_value(&self, row: usize) -> String {
        match &self.column {
            Column::Numeric(values) => values[row].to_string(),
            Column::Categorical { codes, levels } => levels[codes[row]].clone(),
        }
    }

    /// Return the level labels (empty for numeric features).
    #[must_use]
    pub fn levels(&self) -> &[String] {
        match &self.column {
            Column::Numeric(_) => &[],
            Column::Categorical { levels, .. } => levels,
        }
    }

    /// Return the number of levels (0 for numeric features).
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.levels().len()
    }

    /// Return the distinct values present in the column, sorted ascending.
    ///
    /// Categorical features report their observed codes.
    #[must_use]
    pub fn distinct_values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = (0..self.len()).map(|row| self.value(row)).collect();
        values.sort_unstable_by(|a, b| a.total_cmp(b));
        values.dedup();
        values
    }

    pub(crate) fn numeric_values(&self) -> Option<&[f64]> {
        match &self.column {
            Column::Numeric(values) => Some(values),
            Column::Categorical { .. } => None,
        }
    }

    pub(crate) fn codes(&self) -> Option<&[usize]> {
        match &self.column {
            Column::Numeric(_) => None,
            Column::Categorical { codes, .. } => Some(codes),
        }
    }

    /// Copy of this categorical feature re-coded against `levels`.
    ///
    /// Labels missing from `levels` are appended after them, so their codes
    /// never match a code seen in training. Numeric features are cloned.
    pub(crate) fn recoded(&self, levels: &[String]) -> Self {
        let Column::Categorical {
            codes,
            levels: own_levels,
        } = &self.column
        else {
            return self.clone();
        };
        let mut new_levels = levels.to_vec();
        let mapping: Vec<usize> = own_levels
            .iter()
            .map(|label| match new_levels.iter().position(|l| l == label) {
                Some(code) => code,
                None => {
                    new_levels.push(label.clone());
                    new_levels.len() - 1
                }
            })
            .collect();
        Self {
            name: self.name.clone(),
            column: Column::Categorical {
                codes: codes.iter().map(|&c| mapping[c]).collect(),
                levels: new_levels,
            },
        }
    }

    /// Copy of this feature with every row set to `value` (a code for categorical features).
    pub(crate) fn filled(&self, value: f64) -> Self {
        let n = self.len();
        let column = match &self.column {
            Column::Numeric(_) => Column::Numeric(vec![value; n]),
            Column::Categorical { levels, .. } => Column::Categorical {
                codes: vec![value as usize; n],
                levels: levels.clone(),
            },
        };
        Self {
            name: self.name.clone(),
            column,
        }
    }
}

/// An ordered set of equally long, uniquely named features.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    features: Vec<Feature>,
    index: HashMap<String, usize>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Build a matrix from its columns.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                     |
    /// |--------------------------------------|------------------------------------------|
    /// | [`ForestError::EmptyDataset`]        | no features, or zero rows                |
    /// | [`ForestError::RowCountMismatch`]    | features differ in length                |
    /// | [`ForestError::DuplicateFeature`]    | two features share a name                |
    /// | [`ForestError::NonFiniteValue`]      | a numeric value is NaN or infinite       |
    pub fn new(features: Vec<Feature>) -> Result<Self, ForestError> {
        let n_rows = features.first().map_or(0, Feature::len);
        if n_rows == 0 {
            return Err(ForestError::EmptyDataset);
        }

        let mut index = HashMap::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            if feature.len() != n_rows {
                return Err(ForestError::RowCountMismatch {
                    name: feature.name.clone(),
                    expected: n_rows,
                    got: feature.len(),
                });
            }
            if index.insert(feature.name.clone(), i).is_some() {
                return Err(ForestError::DuplicateFeature {
                    name: feature.name.clone(),
                });
            }
            if let Some(values) = feature.numeric_values()
                && let Some(row) = values.iter().position(|v| !v.is_finite())
            {
                return Err(ForestError::NonFiniteValue {
                    name: feature.name.clone(),
                    row,
                });
            }
        }

        Ok(Self {
            features,
            index,
            n_rows,
        })
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Return all features in column order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Return the column position of `name`, if present.
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Look up a feature by name.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::UnknownFeature`] when no feature has that name.
    pub fn feature(&self, name: &str) -> Result<&Feature, ForestError> {
        self.feature_index(name)
            .map(|i| &self.features[i])
            .ok_or_else(|| ForestError::UnknownFeature {
                name: name.to_string(),
            })
    }

    /// Copy of this matrix with each `(column, value)` column overwritten by a constant.
    pub(crate) fn with_constant_columns(&self, replacements: &[(usize, f64)]) -> Self {
        let mut features = self.features.clone();
        for &(column, value) in replacements {
            features[column] = self.features[column].filled(value);
        }
        Self {
            features,
            index: self.index.clone(),
            n_rows: self.n_rows,
        }
    }
}

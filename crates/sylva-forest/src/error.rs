/// Errors from forest growth, prediction and diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when n_samples is zero, or exceeds the row count when
    /// sub-sampling without replacement.
    #[error("n_samples = {n_samples} is invalid for {sampling} sampling of {n_rows} rows")]
    InvalidSampleSize {
        /// The invalid n_samples value provided.
        n_samples: usize,
        /// Number of rows in the training matrix.
        n_rows: usize,
        /// The configured sampling mode.
        sampling: crate::config::Sampling,
    },

    /// Returned when m_try resolves to 0 or exceeds the predictor count.
    #[error("m_try resolved to {m_try}, but must be in [1, {n_predictors}]")]
    InvalidMTry {
        /// The resolved m_try value.
        m_try: usize,
        /// The number of predictor features.
        n_predictors: usize,
    },

    /// Returned when leaf_size is zero.
    #[error("leaf_size must be at least 1, got {leaf_size}")]
    InvalidLeafSize {
        /// The invalid leaf_size value provided.
        leaf_size: usize,
    },

    /// Returned when a matrix or input table has zero rows or columns.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Returned when the matrix has no columns besides the target.
    #[error("no predictor features besides target \"{target}\"")]
    NoPredictors {
        /// Name of the target feature.
        target: String,
    },

    /// Returned when a feature name is not present in the matrix.
    #[error("unknown feature \"{name}\"")]
    UnknownFeature {
        /// The feature name that was looked up.
        name: String,
    },

    /// Returned when two features in one matrix share a name.
    #[error("duplicate feature name \"{name}\"")]
    DuplicateFeature {
        /// The repeated feature name.
        name: String,
    },

    /// Returned when a feature's length differs from the matrix row count.
    #[error("feature \"{name}\" has {got} rows, expected {expected}")]
    RowCountMismatch {
        /// Name of the offending feature.
        name: String,
        /// The matrix row count.
        expected: usize,
        /// The feature's row count.
        got: usize,
    },

    /// Returned when a row index is past the end of the matrix.
    #[error("row {row} is out of range for a matrix with {n_rows} rows")]
    RowOutOfRange {
        /// The requested row.
        row: usize,
        /// The matrix row count.
        n_rows: usize,
    },

    /// Returned when a numeric feature value is NaN or infinite.
    #[error("non-finite value in feature \"{name}\" at row {row}")]
    NonFiniteValue {
        /// Name of the offending feature.
        name: String,
        /// The zero-based row index.
        row: usize,
    },

    /// Returned when a categorical code has no matching level label.
    #[error("feature \"{name}\" has code {code} at row {row}, but only {n_levels} levels")]
    InvalidCategoryCode {
        /// Name of the offending feature.
        name: String,
        /// The zero-based row index.
        row: usize,
        /// The out-of-range code.
        code: usize,
        /// Number of declared levels.
        n_levels: usize,
    },

    /// Returned when a prediction matrix column has a different kind than at training time.
    #[error("feature \"{name}\" was {expected} at training time, got {got}")]
    FeatureKindMismatch {
        /// Name of the offending feature.
        name: String,
        /// Kind seen during training.
        expected: crate::matrix::FeatureKind,
        /// Kind supplied now.
        got: crate::matrix::FeatureKind,
    },

    /// Returned when partial dependence is asked for other than one or two features.
    #[error("partial dependence supports 1 or 2 features, got {got}")]
    InvalidArity {
        /// The number of feature names supplied.
        got: usize,
    },

    /// Returned when two tables that must share a shape do not.
    #[error("shape mismatch in {context}: expected {expected_rows}x{expected_cols}, got {got_rows}x{got_cols}")]
    ShapeMismatch {
        /// What was being compared.
        context: &'static str,
        /// Expected row count.
        expected_rows: usize,
        /// Expected column count.
        expected_cols: usize,
        /// Actual row count.
        got_rows: usize,
        /// Actual column count.
        got_cols: usize,
    },

    /// Returned when a class-probability operation is used on a regression forest.
    #[error("forest predicts a numeric target; class probabilities are unavailable")]
    NotClassification,

    /// Returned when a class code is outside the forest's class range.
    #[error("class {class} is out of range for a forest with {n_classes} classes")]
    ClassOutOfRange {
        /// The requested class code.
        class: usize,
        /// Number of classes the forest knows.
        n_classes: usize,
    },

    /// Returned when an OOB operation receives a matrix other than the training matrix,
    /// or when no training row was ever out of bag.
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },
}

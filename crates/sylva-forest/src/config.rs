//! Configuration builder for forest growth.

use std::fmt;

use crate::error::ForestError;
use crate::matrix::{FeatureKind, FeatureMatrix};
use crate::result::ForestResult;
use crate::split::SplitCriterion;

/// Strategy for the number of predictors drawn as split candidates at each node.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MTry {
    /// ⌈√p⌉ for a categorical target, ⌈p/3⌉ for a numeric one.
    Auto,
    /// ⌈√p⌉.
    Sqrt,
    /// ⌈log₂ p⌉, at least 1.
    Log2,
    /// ⌈f·p⌉ for a fraction `f` in (0.0, 1.0].
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// Every predictor (bagged trees).
    All,
}

impl MTry {
    /// Resolve against `n_predictors`; the result is not yet range-checked.
    fn resolve(self, n_predictors: usize, classification: bool) -> usize {
        let p = n_predictors as f64;
        match self {
            MTry::Auto if classification => p.sqrt().ceil() as usize,
            MTry::Auto => ((p / 3.0).ceil() as usize).max(1),
            MTry::Sqrt => p.sqrt().ceil() as usize,
            MTry::Log2 => (p.log2().ceil() as usize).max(1),
            MTry::Fraction(f) if f > 0.0 && f <= 1.0 => (p * f).ceil() as usize,
            MTry::Fraction(_) => 0,
            MTry::Fixed(n) => n,
            MTry::All => n_predictors,
        }
    }
}

/// How each tree's training rows are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Sampling {
    /// With replacement.
    Bootstrap,
    /// Without replacement.
    Subsample,
}

impl fmt::Display for Sampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sampling::Bootstrap => f.write_str("bootstrap"),
            Sampling::Subsample => f.write_str("subsample"),
        }
    }
}

/// Whether to compute out-of-bag evaluation during growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute OOB accuracy (classification) or MSE and R² (regression).
    Enabled,
    /// Skip OOB evaluation.
    Disabled,
}

/// Configuration for forest growth.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter   | Default                 |
/// |-------------|-------------------------|
/// | `n_samples` | training row count      |
/// | `m_try`     | `Auto`                  |
/// | `leaf_size` | 1                       |
/// | `sampling`  | `Bootstrap`             |
/// | `criterion` | `Gini`                  |
/// | `seed`      | 42                      |
/// | `oob_mode`  | `Disabled`              |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) n_samples: Option<usize>,
    pub(crate) m_try: MTry,
    pub(crate) leaf_size: usize,
    pub(crate) sampling: Sampling,
    pub(crate) criterion: SplitCriterion,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
}

/// Parameters after resolution against a concrete matrix and target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedConfig {
    pub(crate) n_samples: usize,
    pub(crate) m_try: usize,
    pub(crate) leaf_size: usize,
    pub(crate) sampling: Sampling,
    pub(crate) criterion: SplitCriterion,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            n_samples: None,
            m_try: MTry::Auto,
            leaf_size: 1,
            sampling: Sampling::Bootstrap,
            criterion: SplitCriterion::Gini,
            seed: 42,
            oob_mode: OobMode::Disabled,
        })
    }

    // --- Setters ---

    /// Set the number of rows drawn per tree.
    #[must_use]
    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = Some(n_samples);
        self
    }

    /// Set the candidate-predictor strategy.
    #[must_use]
    pub fn with_m_try(mut self, m_try: MTry) -> Self {
        self.m_try = m_try;
        self
    }

    /// Set the minimum number of rows on each side of a split.
    #[must_use]
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    /// Set the row sampling mode.
    #[must_use]
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the impurity criterion used for categorical targets.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the explicit per-tree sample size, if set.
    #[must_use]
    pub fn n_samples(&self) -> Option<usize> {
        self.n_samples
    }

    /// Return the candidate-predictor strategy.
    #[must_use]
    pub fn m_try(&self) -> MTry {
        self.m_try
    }

    /// Return the minimum leaf size.
    #[must_use]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Return the row sampling mode.
    #[must_use]
    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    /// Return the categorical-target criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the OOB evaluation mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Grow a forest predicting `target` from every other column of `matrix`.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                               |
    /// |----------------------------------------|----------------------------------------------------|
    /// | [`ForestError::UnknownFeature`]        | `target` is not a column of `matrix`               |
    /// | [`ForestError::NoPredictors`]          | `target` is the only column                        |
    /// | [`ForestError::InvalidSampleSize`]     | `n_samples` is zero, or too large for `Subsample`  |
    /// | [`ForestError::InvalidMTry`]           | resolved `m_try` is outside [1, n_predictors]      |
    /// | [`ForestError::InvalidLeafSize`]       | `leaf_size` is zero                                |
    /// | [`ForestError::OobEvaluationFailed`]   | OOB enabled but no row was ever out of bag         |
    pub fn fit(&self, matrix: &FeatureMatrix, target: &str) -> Result<ForestResult, ForestError> {
        crate::forest::grow_forest(matrix, target, self)
    }

    /// Validate every parameter against `matrix` and resolve the defaults.
    pub(crate) fn resolve(
        &self,
        matrix: &FeatureMatrix,
        target: &str,
    ) -> Result<ResolvedConfig, ForestError> {
        if self.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount {
                n_trees: self.n_trees,
            });
        }

        let target_feature = matrix.feature(target)?;
        let n_predictors = matrix.n_features() - 1;
        if n_predictors == 0 {
            return Err(ForestError::NoPredictors {
                target: target.to_string(),
            });
        }

        if self.leaf_size == 0 {
            return Err(ForestError::InvalidLeafSize {
                leaf_size: self.leaf_size,
            });
        }

        let n_rows = matrix.n_rows();
        let n_samples = self.n_samples.unwrap_or(n_rows);
        let too_many = self.sampling == Sampling::Subsample && n_samples > n_rows;
        if n_samples == 0 || too_many {
            return Err(ForestError::InvalidSampleSize {
                n_samples,
                n_rows,
                sampling: self.sampling,
            });
        }

        let classification = target_feature.kind() == FeatureKind::Categorical;
        let m_try = self.m_try.resolve(n_predictors, classification);
        if m_try == 0 || m_try > n_predictors {
            return Err(ForestError::InvalidMTry {
                m_try,
                n_predictors,
            });
        }

        Ok(ResolvedConfig {
            n_samples,
            m_try,
            leaf_size: self.leaf_size,
            sampling: self.sampling,
            criterion: self.criterion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Feature;

    fn matrix(n_predictors: usize, categorical_target: bool) -> FeatureMatrix {
        let mut features: Vec<Feature> = (0..n_predictors)
            .map(|i| Feature::numeric(format!("x{i}"), vec![0.0, 1.0, 2.0, 3.0]))
            .collect();
        if categorical_target {
            features.push(Feature::categorical("y", &["a", "b", "a", "b"]));
        } else {
            features.push(Feature::numeric("y", vec![1.0, 2.0, 3.0, 4.0]));
        }
        FeatureMatrix::new(features).unwrap()
    }

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            ForestConfig::new(0).unwrap_err(),
            ForestError::InvalidTreeCount { n_trees: 0 }
        ));
    }

    #[test]
    fn defaults() {
        let config = ForestConfig::new(10).unwrap();
        assert_eq!(config.n_trees(), 10);
        assert_eq!(config.n_samples(), None);
        assert_eq!(config.m_try(), MTry::Auto);
        assert_eq!(config.leaf_size(), 1);
        assert_eq!(config.sampling(), Sampling::Bootstrap);
        assert_eq!(config.criterion(), SplitCriterion::Gini);
        assert_eq!(config.seed(), 42);
        assert_eq!(config.oob_mode(), OobMode::Disabled);
    }

    #[test]
    fn auto_m_try_depends_on_target_kind() {
        let config = ForestConfig::new(1).unwrap();
        // 10 predictors: ceil(sqrt(10)) = 4, ceil(10 / 3) = 4
        // 7 predictors: ceil(sqrt(7)) = 3, ceil(7 / 3) = 3
        // 2 predictors: ceil(sqrt(2)) = 2, ceil(2 / 3) = 1
        assert_eq!(config.resolve(&matrix(2, true), "y").unwrap().m_try, 2);
        assert_eq!(config.resolve(&matrix(2, false), "y").unwrap().m_try, 1);
        assert_eq!(config.resolve(&matrix(7, false), "y").unwrap().m_try, 3);
    }

    #[test]
    fn m_try_strategies() {
        assert_eq!(MTry::Sqrt.resolve(9, false), 3);
        assert_eq!(MTry::Log2.resolve(8, true), 3);
        assert_eq!(MTry::Log2.resolve(1, true), 1);
        assert_eq!(MTry::Fraction(0.5).resolve(5, true), 3);
        assert_eq!(MTry::Fraction(1.5).resolve(5, true), 0);
        assert_eq!(MTry::Fixed(2).resolve(5, true), 2);
        assert_eq!(MTry::All.resolve(5, true), 5);
    }

    #[test]
    fn m_try_above_predictor_count_rejected() {
        let err = ForestConfig::new(1)
            .unwrap()
            .with_m_try(MTry::Fixed(4))
            .resolve(&matrix(3, true), "y")
            .unwrap_err();
        assert!(matches!(
            err,
            ForestError::InvalidMTry {
                m_try: 4,
                n_predictors: 3
            }
        ));
    }

    #[test]
    fn sample_size_checks() {
        let m = matrix(2, true);
        let zero = ForestConfig::new(1).unwrap().with_n_samples(0);
        assert!(matches!(
            zero.resolve(&m, "y").unwrap_err(),
            ForestError::InvalidSampleSize { n_samples: 0, .. }
        ));

        // Bootstrap may draw more rows than exist; sub-sampling may not.
        let big = ForestConfig::new(1).unwrap().with_n_samples(10);
        assert_eq!(big.resolve(&m, "y").unwrap().n_samples, 10);
        let err = big
            .with_sampling(Sampling::Subsample)
            .resolve(&m, "y")
            .unwrap_err();
        assert!(matches!(
            err,
            ForestError::InvalidSampleSize {
                n_samples: 10,
                n_rows: 4,
                sampling: Sampling::Subsample
            }
        ));
    }

    #[test]
    fn leaf_size_zero_rejected() {
        let err = ForestConfig::new(1)
            .unwrap()
            .with_leaf_size(0)
            .resolve(&matrix(2, true), "y")
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidLeafSize { leaf_size: 0 }));
    }

    #[test]
    fn target_lookup_errors() {
        let config = ForestConfig::new(1).unwrap();
        assert!(matches!(
            config.resolve(&matrix(2, true), "missing").unwrap_err(),
            ForestError::UnknownFeature { .. }
        ));
        assert!(matches!(
            config.resolve(&matrix(0, true), "y").unwrap_err(),
            ForestError::NoPredictors { .. }
        ));
    }
}

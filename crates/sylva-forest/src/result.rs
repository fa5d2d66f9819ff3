//! Growth result types.

use crate::config::Sampling;
use crate::forest::RandomForest;
use crate::importance::RankedFeature;
use crate::oob::OobScore;

/// Metadata about the growth run, with every parameter resolved.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrainingMetadata {
    /// Number of trees grown.
    pub n_trees: usize,
    /// Number of training rows.
    pub n_rows: usize,
    /// Number of predictor columns.
    pub n_predictors: usize,
    /// Number of target classes (0 for a numeric target).
    pub n_classes: usize,
    /// Rows drawn per tree.
    pub n_samples: usize,
    /// Candidate predictors per node.
    pub m_try: usize,
    /// Minimum rows per leaf.
    pub leaf_size: usize,
    /// Row sampling mode.
    pub sampling: Sampling,
}

/// Result of forest growth.
///
/// Contains the forest, impurity importances, optional OOB score, and
/// training metadata.
#[derive(Debug)]
pub struct ForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
    metadata: TrainingMetadata,
}

impl ForestResult {
    /// Create a new growth result.
    pub(crate) fn new(
        forest: RandomForest,
        importances: Vec<RankedFeature>,
        oob_score: Option<OobScore>,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            forest,
            importances,
            oob_score,
            metadata,
        }
    }

    /// Borrow the forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Consume the result and return the forest.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Return the ranked impurity importances.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// Return the OOB score, if computed.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }
}

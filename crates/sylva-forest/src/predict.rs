//! Prediction methods for the forest ensemble.

use std::borrow::Cow;

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::ForestError;
use crate::forest::RandomForest;
use crate::matrix::{Feature, FeatureKind, FeatureMatrix};
use crate::node::LeafValue;
use crate::tree::DecisionTree;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    /// Create a new class distribution.
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class: the highest probability, the lowest code on ties.
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        self.probs
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (class, &p)| {
                if p > best.1 { (class, p) } else { best }
            })
            .0
    }

    /// Return the top-k classes sorted by descending probability.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> = self.probs.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
        indexed
    }

    /// Return the probability of `class`, if it exists.
    #[must_use]
    pub fn probability(&self, class: usize) -> Option<f64> {
        self.probs.get(class).copied()
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

/// Scalar response extracted from each tree or from the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Leaf mean for a numeric target, predicted class code for a categorical one.
    Value,
    /// Probability of the given class code (categorical targets only).
    Probability(usize),
}

/// Sum of leaf predictions over some subset of trees.
enum Aggregate {
    Mean(f64),
    Distribution(ClassDistribution),
}

impl Aggregate {
    fn value(&self) -> f64 {
        match self {
            Aggregate::Mean(mean) => *mean,
            Aggregate::Distribution(dist) => dist.predicted_class() as f64,
        }
    }

    fn response(&self, response: Response) -> f64 {
        match (self, response) {
            (Aggregate::Distribution(dist), Response::Probability(class)) => {
                dist.probability(class).unwrap_or(0.0)
            }
            _ => self.value(),
        }
    }
}

/// Prediction-matrix columns in predictor order.
type Columns<'m> = Vec<Cow<'m, Feature>>;

impl RandomForest {
    /// Look up every predictor of the forest in `matrix` by name.
    ///
    /// Categorical columns whose levels differ from training are re-coded
    /// against the training levels; unseen labels go right at every split.
    pub(crate) fn resolve_columns<'m>(
        &self,
        matrix: &'m FeatureMatrix,
    ) -> Result<Columns<'m>, ForestError> {
        self.predictors
            .iter()
            .map(|schema| {
                let feature = matrix.feature(&schema.name)?;
                if feature.kind() != schema.kind {
                    return Err(ForestError::FeatureKindMismatch {
                        name: schema.name.clone(),
                        expected: schema.kind,
                        got: feature.kind(),
                    });
                }
                if schema.kind == FeatureKind::Categorical && feature.levels() != schema.levels {
                    Ok(Cow::Owned(feature.recoded(&schema.levels)))
                } else {
                    Ok(Cow::Borrowed(feature))
                }
            })
            .collect()
    }

    fn tree_leaf<'t>(tree: &'t DecisionTree, columns: &Columns<'_>, row: usize) -> &'t LeafValue {
        tree.leaf(|feature| columns[feature.index()].value(row))
    }

    /// Combine the leaves of the trees selected by `include`; `None` if no tree is selected.
    fn aggregate(
        &self,
        columns: &Columns<'_>,
        row: usize,
        include: impl Fn(usize) -> bool,
    ) -> Option<Aggregate> {
        let mut n_used = 0usize;
        let mut sum = 0.0f64;
        let mut probs = vec![0.0f64; self.n_classes()];

        for (tree_idx, tree) in self.trees.iter().enumerate() {
            if !include(tree_idx) {
                continue;
            }
            n_used += 1;
            match Self::tree_leaf(tree, columns, row) {
                LeafValue::Mean(mean) => sum += mean,
                LeafValue::Classes { distribution, .. } => probs
                    .iter_mut()
                    .zip(distribution)
                    .for_each(|(acc, p)| *acc += p),
            }
        }

        if n_used == 0 {
            return None;
        }
        let n = n_used as f64;
        if self.is_classification() {
            probs.iter_mut().for_each(|v| *v /= n);
            Some(Aggregate::Distribution(ClassDistribution::new(probs)))
        } else {
            Some(Aggregate::Mean(sum / n))
        }
    }

    fn check_row(matrix: &FeatureMatrix, row: usize) -> Result<(), ForestError> {
        if row >= matrix.n_rows() {
            return Err(ForestError::RowOutOfRange {
                row,
                n_rows: matrix.n_rows(),
            });
        }
        Ok(())
    }

    fn check_response(&self, response: Response) -> Result<(), ForestError> {
        match response {
            Response::Value => Ok(()),
            Response::Probability(_) if !self.is_classification() => {
                Err(ForestError::NotClassification)
            }
            Response::Probability(class) if class >= self.n_classes() => {
                Err(ForestError::ClassOutOfRange {
                    class,
                    n_classes: self.n_classes(),
                })
            }
            Response::Probability(_) => Ok(()),
        }
    }

    /// Predict one row: the mean of the tree means for a numeric target,
    /// the argmax code of the averaged class distribution otherwise.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                         |
    /// |-----------------------------------------|----------------------------------------------|
    /// | [`ForestError::RowOutOfRange`]          | `row >= matrix.n_rows()`                     |
    /// | [`ForestError::UnknownFeature`]         | a predictor is missing from `matrix`         |
    /// | [`ForestError::FeatureKindMismatch`]    | a predictor changed kind since training      |
    pub fn predict(&self, matrix: &FeatureMatrix, row: usize) -> Result<f64, ForestError> {
        Self::check_row(matrix, row)?;
        let columns = self.resolve_columns(matrix)?;
        Ok(self
            .aggregate(&columns, row, |_| true)
            .map_or(0.0, |agg| agg.value()))
    }

    /// Predict every row of `matrix` in parallel.
    ///
    /// # Errors
    ///
    /// Same column-resolution errors as [`RandomForest::predict`].
    pub fn predict_batch(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ForestError> {
        self.predict_response(matrix, Response::Value)
    }

    /// Predict a scalar response for every row of `matrix` in parallel.
    ///
    /// # Errors
    ///
    /// Column-resolution errors as [`RandomForest::predict`], plus
    /// [`ForestError::NotClassification`] and [`ForestError::ClassOutOfRange`]
    /// for an invalid [`Response::Probability`].
    pub fn predict_response(
        &self,
        matrix: &FeatureMatrix,
        response: Response,
    ) -> Result<Vec<f64>, ForestError> {
        self.check_response(response)?;
        let columns = self.resolve_columns(matrix)?;
        Ok((0..matrix.n_rows())
            .into_par_iter()
            .map(|row| {
                self.aggregate(&columns, row, |_| true)
                    .map_or(0.0, |agg| agg.response(response))
            })
            .collect())
    }

    /// Return the averaged class distribution for one row.
    ///
    /// # Errors
    ///
    /// [`ForestError::NotClassification`] for a numeric target, otherwise as
    /// [`RandomForest::predict`].
    pub fn predict_proba(
        &self,
        matrix: &FeatureMatrix,
        row: usize,
    ) -> Result<ClassDistribution, ForestError> {
        if !self.is_classification() {
            return Err(ForestError::NotClassification);
        }
        Self::check_row(matrix, row)?;
        let columns = self.resolve_columns(matrix)?;
        Ok(self.distribution(&columns, row))
    }

    /// Return averaged class distributions for every row of `matrix` in parallel.
    ///
    /// # Errors
    ///
    /// As [`RandomForest::predict_proba`].
    pub fn predict_proba_batch(
        &self,
        matrix: &FeatureMatrix,
    ) -> Result<Vec<ClassDistribution>, ForestError> {
        if !self.is_classification() {
            return Err(ForestError::NotClassification);
        }
        let columns = self.resolve_columns(matrix)?;
        Ok((0..matrix.n_rows())
            .into_par_iter()
            .map(|row| self.distribution(&columns, row))
            .collect())
    }

    fn distribution(&self, columns: &Columns<'_>, row: usize) -> ClassDistribution {
        match self.aggregate(columns, row, |_| true) {
            Some(Aggregate::Distribution(dist)) => dist,
            _ => ClassDistribution::new(vec![0.0; self.n_classes()]),
        }
    }

    fn check_training_matrix(&self, matrix: &FeatureMatrix) -> Result<(), ForestError> {
        if matrix.n_rows() != self.n_training_rows {
            return Err(ForestError::OobEvaluationFailed {
                reason: format!(
                    "matrix has {} rows but the forest was grown on {}",
                    matrix.n_rows(),
                    self.n_training_rows
                ),
            });
        }
        Ok(())
    }

    /// Predict a training row using only the trees that left it out of bag.
    ///
    /// Returns `Ok(None)` when every tree drew the row.
    ///
    /// # Errors
    ///
    /// [`ForestError::OobEvaluationFailed`] when `matrix` does not have the
    /// training row count, otherwise as [`RandomForest::predict`].
    pub fn predict_oob(
        &self,
        matrix: &FeatureMatrix,
        row: usize,
    ) -> Result<Option<f64>, ForestError> {
        self.check_training_matrix(matrix)?;
        Self::check_row(matrix, row)?;
        let columns = self.resolve_columns(matrix)?;
        Ok(self
            .aggregate(&columns, row, |tree| !self.in_bag[tree].is_in_bag(row))
            .map(|agg| agg.value()))
    }

    /// OOB prediction for every training row, in parallel.
    ///
    /// # Errors
    ///
    /// As [`RandomForest::predict_oob`].
    pub fn predict_oob_batch(&self, matrix: &FeatureMatrix) -> Result<Vec<Option<f64>>, ForestError> {
        self.check_training_matrix(matrix)?;
        let columns = self.resolve_columns(matrix)?;
        Ok((0..matrix.n_rows())
            .into_par_iter()
            .map(|row| {
                self.aggregate(&columns, row, |tree| !self.in_bag[tree].is_in_bag(row))
                    .map(|agg| agg.value())
            })
            .collect())
    }

    /// Per-tree responses: one row per matrix row, one column per tree.
    ///
    /// # Errors
    ///
    /// As [`RandomForest::predict_response`].
    pub fn tree_responses(
        &self,
        matrix: &FeatureMatrix,
        response: Response,
    ) -> Result<Vec<Vec<f64>>, ForestError> {
        self.check_response(response)?;
        let columns = self.resolve_columns(matrix)?;
        Ok((0..matrix.n_rows())
            .into_par_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| match (Self::tree_leaf(tree, &columns, row), response) {
                        (LeafValue::Classes { distribution, .. }, Response::Probability(class)) => {
                            distribution.get(class).copied().unwrap_or(0.0)
                        }
                        (leaf, _) => leaf.value(),
                    })
                    .collect()
            })
            .collect())
    }

    /// In-bag counts: one row per training row, one column per tree.
    #[must_use]
    pub fn in_bag_matrix(&self) -> Vec<Vec<f64>> {
        (0..self.n_training_rows)
            .map(|row| {
                self.in_bag
                    .iter()
                    .map(|bag| f64::from(bag.count(row)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForestConfig, MTry, Sampling};

    fn regression_matrix() -> FeatureMatrix {
        let x: Vec<f64> = (0..30).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| if *v < 15.0 { 1.0 } else { 5.0 }).collect();
        FeatureMatrix::new(vec![Feature::numeric("x", x), Feature::numeric("y", y)]).unwrap()
    }

    fn classification_matrix() -> FeatureMatrix {
        let x: Vec<f64> = (0..30).map(f64::from).collect();
        let labels: Vec<&str> = (0..30).map(|i| if i < 10 { "lo" } else if i < 20 { "mid" } else { "hi" }).collect();
        let colour: Vec<&str> = (0..30).map(|i| if i % 2 == 0 { "red" } else { "blue" }).collect();
        FeatureMatrix::new(vec![
            Feature::numeric("x", x),
            Feature::categorical("colour", &colour),
            Feature::categorical("label", &labels),
        ])
        .unwrap()
    }

    #[test]
    fn predicted_class_prefers_lowest_code_on_ties() {
        let dist = ClassDistribution::new(vec![0.4, 0.4, 0.2]);
        assert_eq!(dist.predicted_class(), 0);
        assert_eq!(dist.top_k(1), vec![(0, 0.4)]);
        assert_eq!(dist.probability(2), Some(0.2));
        assert_eq!(dist.probability(3), None);
    }

    #[test]
    fn forest_prediction_is_mean_of_tree_predictions() {
        let m = regression_matrix();
        let forest = ForestConfig::new(7).unwrap().fit(&m, "y").unwrap().into_forest();
        let per_tree = forest.tree_responses(&m, Response::Value).unwrap();
        let batch = forest.predict_batch(&m).unwrap();
        for (row, tree_values) in per_tree.iter().enumerate() {
            assert_eq!(tree_values.len(), 7);
            let mean = tree_values.iter().sum::<f64>() / 7.0;
            assert!((batch[row] - mean).abs() < 1e-9);
            assert!((forest.predict(&m, row).unwrap() - batch[row]).abs() < 1e-12);
        }
    }

    #[test]
    fn proba_batch_matches_individual() {
        let m = classification_matrix();
        let forest = ForestConfig::new(10).unwrap().fit(&m, "label").unwrap().into_forest();
        let batch = forest.predict_proba_batch(&m).unwrap();
        for (row, dist) in batch.iter().enumerate() {
            let single = forest.predict_proba(&m, row).unwrap();
            assert_eq!(dist.as_slice(), single.as_slice());
            let total: f64 = dist.as_slice().iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        let p0 = forest.predict_response(&m, Response::Probability(0)).unwrap();
        assert!((p0[0] - batch[0].as_slice()[0]).abs() < 1e-12);
    }

    #[test]
    fn probability_requests_are_validated() {
        let reg = regression_matrix();
        let forest = ForestConfig::new(2).unwrap().fit(&reg, "y").unwrap().into_forest();
        assert!(matches!(
            forest.predict_response(&reg, Response::Probability(0)).unwrap_err(),
            ForestError::NotClassification
        ));
        assert!(matches!(
            forest.predict_proba(&reg, 0).unwrap_err(),
            ForestError::NotClassification
        ));

        let cls = classification_matrix();
        let forest = ForestConfig::new(2).unwrap().fit(&cls, "label").unwrap().into_forest();
        assert!(matches!(
            forest.tree_responses(&cls, Response::Probability(3)).unwrap_err(),
            ForestError::ClassOutOfRange { class: 3, n_classes: 3 }
        ));
    }

    #[test]
    fn predictors_resolved_by_name() {
        let m = regression_matrix();
        let forest = ForestConfig::new(3).unwrap().fit(&m, "y").unwrap().into_forest();

        // Column order and the absent target do not matter.
        let reordered = FeatureMatrix::new(vec![
            Feature::numeric("other", vec![0.0, 0.0]),
            Feature::numeric("x", vec![2.0, 25.0]),
        ])
        .unwrap();
        let preds = forest.predict_batch(&reordered).unwrap();
        assert!(preds[0] < preds[1]);

        let missing = FeatureMatrix::new(vec![Feature::numeric("z", vec![1.0])]).unwrap();
        assert!(matches!(
            forest.predict(&missing, 0).unwrap_err(),
            ForestError::UnknownFeature { .. }
        ));

        let wrong_kind = FeatureMatrix::new(vec![Feature::categorical("x", &["a"])]).unwrap();
        assert!(matches!(
            forest.predict(&wrong_kind, 0).unwrap_err(),
            ForestError::FeatureKindMismatch { .. }
        ));
        assert!(matches!(
            forest.predict(&reordered, 2).unwrap_err(),
            ForestError::RowOutOfRange { row: 2, n_rows: 2 }
        ));
    }

    #[test]
    fn unseen_categories_are_accepted() {
        let m = classification_matrix();
        let forest = ForestConfig::new(5)
            .unwrap()
            .with_m_try(MTry::All)
            .fit(&m, "label")
            .unwrap()
            .into_forest();
        let fresh = FeatureMatrix::new(vec![
            Feature::numeric("x", vec![3.0, 25.0]),
            Feature::categorical("colour", &["green", "blue"]),
        ])
        .unwrap();
        let preds = forest.predict_batch(&fresh).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(forest.class_label(preds[1] as usize), Some("hi"));
    }

    #[test]
    fn oob_uses_only_out_of_bag_trees() {
        let m = regression_matrix();
        let forest = ForestConfig::new(20).unwrap().fit(&m, "y").unwrap().into_forest();
        let per_tree = forest.tree_responses(&m, Response::Value).unwrap();

        for row in 0..m.n_rows() {
            let oob_trees: Vec<f64> = (0..forest.n_trees())
                .filter(|&t| !forest.in_bag()[t].is_in_bag(row))
                .map(|t| per_tree[row][t])
                .collect();
            let oob = forest.predict_oob(&m, row).unwrap();
            if oob_trees.is_empty() {
                assert_eq!(oob, None);
            } else {
                let mean = oob_trees.iter().sum::<f64>() / oob_trees.len() as f64;
                assert!((oob.unwrap() - mean).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn oob_rejects_foreign_matrix() {
        let m = regression_matrix();
        let forest = ForestConfig::new(2).unwrap().fit(&m, "y").unwrap().into_forest();
        let other = FeatureMatrix::new(vec![Feature::numeric("x", vec![1.0])]).unwrap();
        assert!(matches!(
            forest.predict_oob(&other, 0).unwrap_err(),
            ForestError::OobEvaluationFailed { .. }
        ));
    }

    #[test]
    fn subsampling_every_row_leaves_nothing_out_of_bag() {
        let m = regression_matrix();
        let forest = ForestConfig::new(3)
            .unwrap()
            .with_sampling(Sampling::Subsample)
            .fit(&m, "y")
            .unwrap()
            .into_forest();
        assert!(forest.predict_oob_batch(&m).unwrap().iter().all(Option::is_none));
        let in_bag = forest.in_bag_matrix();
        assert_eq!(in_bag.len(), 30);
        assert!(in_bag.iter().all(|row| row == &vec![1.0; 3]));
    }
}

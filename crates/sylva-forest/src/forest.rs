//! Forest growth with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{ForestConfig, OobMode};
use crate::error::ForestError;
use crate::importance::aggregate_importances;
use crate::matrix::{Feature, FeatureKind, FeatureMatrix};
use crate::oob::compute_oob;
use crate::result::{ForestResult, TrainingMetadata};
use crate::tree::{DecisionTree, InBag, TrainingData, TreeGrower};

/// Name, kind and (for categorical columns) level labels of a training column.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Numeric or categorical.
    pub kind: FeatureKind,
    /// Level labels in code order; empty for numeric columns.
    pub levels: Vec<String>,
}

impl ColumnSchema {
    fn of(feature: &Feature) -> Self {
        Self {
            name: feature.name().to_string(),
            kind: feature.kind(),
            levels: feature.levels().to_vec(),
        }
    }
}

/// A grown random forest.
///
/// Holds each tree with its in-bag record, the predictor schema the split
/// features index into, and the target schema. Read-only after growth.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) in_bag: Vec<InBag>,
    pub(crate) predictors: Vec<ColumnSchema>,
    pub(crate) target: ColumnSchema,
    pub(crate) n_training_rows: usize,
}

impl RandomForest {
    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the trees in growth order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the in-bag record of each tree, in tree order.
    #[must_use]
    pub fn in_bag(&self) -> &[InBag] {
        &self.in_bag
    }

    /// Return the predictor schema; split features index into it.
    #[must_use]
    pub fn predictors(&self) -> &[ColumnSchema] {
        &self.predictors
    }

    /// Return the predictor names in schema order.
    #[must_use]
    pub fn predictor_names(&self) -> Vec<&str> {
        self.predictors.iter().map(|p| p.name.as_str()).collect()
    }

    /// Return the target schema.
    #[must_use]
    pub fn target(&self) -> &ColumnSchema {
        &self.target
    }

    /// Return `true` if the forest predicts a categorical target.
    #[must_use]
    pub fn is_classification(&self) -> bool {
        self.target.kind == FeatureKind::Categorical
    }

    /// Return the number of target classes (0 for a numeric target).
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.target.levels.len()
    }

    /// Return the class label for a class code, if it exists.
    #[must_use]
    pub fn class_label(&self, class: usize) -> Option<&str> {
        self.target.levels.get(class).map(String::as_str)
    }

    /// Return the number of rows the forest was grown on.
    #[must_use]
    pub fn n_training_rows(&self) -> usize {
        self.n_training_rows
    }
}

/// Grow a forest predicting `target` from every other column of `matrix`.
///
/// Per-tree seeds are drawn up front from a master `ChaCha8Rng`, so the
/// result depends only on the seed, never on the thread count.
///
/// # Errors
///
/// See [`ForestConfig::fit`].
#[instrument(skip_all, fields(n_trees = config.n_trees, n_rows = matrix.n_rows(), target_name = %target))]
pub fn grow_forest(
    matrix: &FeatureMatrix,
    target: &str,
    config: &ForestConfig,
) -> Result<ForestResult, ForestError> {
    let params = config.resolve(matrix, target)?;
    let data = TrainingData::new(matrix, target, params.criterion)?;
    let target_feature = matrix.feature(target)?;

    let n_predictors = data.predictors.len();
    let n_classes = target_feature.n_levels();

    info!(
        n_trees = config.n_trees,
        n_rows = matrix.n_rows(),
        n_predictors,
        n_classes,
        m_try = params.m_try,
        n_samples = params.n_samples,
        leaf_size = params.leaf_size,
        sampling = %params.sampling,
        "growing random forest"
    );

    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let grower = TreeGrower::new(params);
    let grown: Vec<(DecisionTree, InBag)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            grower.grow(&data, &mut rng)
        })
        .collect();

    let (trees, in_bag): (Vec<DecisionTree>, Vec<InBag>) = grown.into_iter().unzip();

    let predictor_names: Vec<String> = data
        .predictors
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    let per_tree_importances: Vec<Vec<f64>> =
        trees.iter().map(DecisionTree::feature_importances).collect();
    let importances = aggregate_importances(&per_tree_importances, &predictor_names);

    debug!(n_trees_grown = trees.len(), "tree growth complete");

    let forest = RandomForest {
        trees,
        in_bag,
        predictors: data.predictors.iter().map(|f| ColumnSchema::of(f)).collect(),
        target: ColumnSchema::of(target_feature),
        n_training_rows: matrix.n_rows(),
    };

    let oob_score = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(&forest, matrix)?)
    } else {
        None
    };

    let metadata = TrainingMetadata {
        n_trees: config.n_trees,
        n_rows: matrix.n_rows(),
        n_predictors,
        n_classes,
        n_samples: params.n_samples,
        m_try: params.m_try,
        leaf_size: params.leaf_size,
        sampling: params.sampling,
    };

    info!(
        oob_error = oob_score.as_ref().map(|s| s.error()),
        "random forest growth complete"
    );

    Ok(ForestResult::new(forest, importances, oob_score, metadata))
}

#[cfg(test)]
mod tests {
    use crate::config::{ForestConfig, MTry, OobMode, Sampling};
    use crate::matrix::{Feature, FeatureMatrix};
    use crate::oob::OobMetric;

    /// A simple 3-class separable dataset with one noise column.
    fn separable() -> FeatureMatrix {
        let mut x = Vec::new();
        let mut noise = Vec::new();
        let mut labels = Vec::new();
        for (class, offset) in [("a", 0.0), ("b", 10.0), ("c", 20.0)] {
            for i in 0..20 {
                x.push(offset + i as f64 * 0.15);
                noise.push(((i * 7) % 5) as f64);
                labels.push(class);
            }
        }
        FeatureMatrix::new(vec![
            Feature::numeric("x", x),
            Feature::numeric("noise", noise),
            Feature::categorical("class", &labels),
        ])
        .unwrap()
    }

    #[test]
    fn three_class_separable_accuracy() {
        let m = separable();
        let result = ForestConfig::new(50)
            .unwrap()
            .with_m_try(MTry::All)
            .fit(&m, "class")
            .unwrap();

        let predictions = result.forest().predict_batch(&m).unwrap();
        let labels = m.feature("class").unwrap();
        let correct = predictions
            .iter()
            .enumerate()
            .filter(|&(row, &p)| p == labels.value(row))
            .count();
        let accuracy = correct as f64 / m.n_rows() as f64;
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
    }

    #[test]
    fn schema_excludes_target() {
        let m = separable();
        let result = ForestConfig::new(3).unwrap().fit(&m, "class").unwrap();
        let forest = result.forest();
        assert_eq!(forest.predictor_names(), vec!["x", "noise"]);
        assert!(forest.is_classification());
        assert_eq!(forest.n_classes(), 3);
        assert_eq!(forest.class_label(2), Some("c"));
        assert_eq!(forest.n_trees(), 3);
        assert_eq!(forest.in_bag().len(), 3);
        assert_eq!(forest.n_training_rows(), 60);
    }

    #[test]
    fn oob_score_computed() {
        let m = separable();
        let result = ForestConfig::new(50)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit(&m, "class")
            .unwrap();

        let oob = result.oob_score().expect("OOB should be computed");
        let OobMetric::Accuracy { accuracy, .. } = oob.metric else {
            panic!("classification forests report accuracy");
        };
        assert!(accuracy > 0.8, "oob accuracy = {accuracy}");
        assert!(oob.n_oob_samples > 0);
    }

    #[test]
    fn oob_fails_without_out_of_bag_rows() {
        let m = separable();
        let err = ForestConfig::new(5)
            .unwrap()
            .with_sampling(Sampling::Subsample)
            .with_oob_mode(OobMode::Enabled)
            .fit(&m, "class")
            .unwrap_err();
        assert!(matches!(err, crate::ForestError::OobEvaluationFailed { .. }));
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let m = separable();
        let result = ForestConfig::new(20).unwrap().fit(&m, "class").unwrap();

        let total: f64 = result.importances().iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
        assert_eq!(result.importances()[0].name, "x");
    }

    #[test]
    fn deterministic_with_same_seed() {
        let m = separable();
        let config = ForestConfig::new(10).unwrap().with_seed(99);
        let preds1 = config.fit(&m, "class").unwrap().forest().predict_batch(&m).unwrap();
        let preds2 = config.fit(&m, "class").unwrap().forest().predict_batch(&m).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn metadata_reports_resolved_parameters() {
        let m = separable();
        let result = ForestConfig::new(4).unwrap().fit(&m, "class").unwrap();
        let meta = result.metadata();
        assert_eq!(meta.n_trees, 4);
        assert_eq!(meta.n_rows, 60);
        assert_eq!(meta.n_predictors, 2);
        assert_eq!(meta.n_classes, 3);
        assert_eq!(meta.m_try, 2);
        assert_eq!(meta.n_samples, 60);
        assert_eq!(meta.leaf_size, 1);
        assert_eq!(meta.sampling, Sampling::Bootstrap);
    }
}

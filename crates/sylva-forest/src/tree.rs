use rand::Rng;
use tracing::{debug, instrument};

use crate::{
    ForestError,
    config::{ForestConfig, ResolvedConfig, Sampling},
    matrix::{Feature, FeatureMatrix},
    node::{FeatureIndex, LeafValue, Node, NodeIndex},
    split::{NodeStats, SplitCriterion, TargetView, find_best_split, modal_class},
};

/// Per-row multiplicity of the training rows in one tree's sample.
///
/// Rows with count 0 are out of bag for that tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InBag {
    counts: Vec<u32>,
}

impl InBag {
    fn from_rows(n_rows: usize, rows: &[usize]) -> Self {
        let mut counts = vec![0u32; n_rows];
        for &row in rows {
            counts[row] += 1;
        }
        Self { counts }
    }

    /// Return how many times `row` was drawn.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`.
    #[must_use]
    pub fn count(&self, row: usize) -> u32 {
        self.counts[row]
    }

    /// Return `true` if `row` was drawn at least once.
    #[must_use]
    pub fn is_in_bag(&self, row: usize) -> bool {
        self.counts[row] > 0
    }

    /// Return the rows never drawn for this tree.
    #[must_use]
    pub fn oob_rows(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == 0)
            .map(|(row, _)| row)
            .collect()
    }

    /// Return all counts in row order.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Return the number of training rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Return `true` if there are no training rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Borrowed training columns: the predictors in matrix order and the target.
#[derive(Debug)]
pub(crate) struct TrainingData<'a> {
    pub(crate) predictors: Vec<&'a Feature>,
    pub(crate) target: TargetView<'a>,
    pub(crate) n_rows: usize,
}

impl<'a> TrainingData<'a> {
    pub(crate) fn new(
        matrix: &'a FeatureMatrix,
        target: &str,
        criterion: SplitCriterion,
    ) -> Result<Self, ForestError> {
        let target_feature = matrix.feature(target)?;
        let target = match target_feature.codes() {
            Some(codes) => TargetView::Classes {
                codes,
                n_classes: target_feature.n_levels(),
                criterion,
            },
            None => TargetView::Numeric(target_feature.numeric_values().unwrap_or_default()),
        };
        let predictors = matrix
            .features()
            .iter()
            .filter(|f| f.name() != target_feature.name())
            .collect();
        Ok(Self {
            predictors,
            target,
            n_rows: matrix.n_rows(),
        })
    }
}

/// Grows single trees from resolved parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeGrower {
    params: ResolvedConfig,
}

impl TreeGrower {
    pub(crate) fn new(params: ResolvedConfig) -> Self {
        Self { params }
    }

    /// Draw this tree's rows, then build the tree over them.
    pub(crate) fn grow<R: Rng>(&self, data: &TrainingData<'_>, rng: &mut R) -> (DecisionTree, InBag) {
        let rows = self.draw_rows(data.n_rows, rng);
        let in_bag = InBag::from_rows(data.n_rows, &rows);

        let mut arena: Vec<Node> = Vec::new();
        let root = self.build(data, &rows, rng, &mut arena);

        debug!(
            root_index = root.index(),
            n_nodes = arena.len(),
            n_oob = in_bag.oob_rows().len(),
            "tree grown"
        );

        let n_classes = match data.target {
            TargetView::Numeric(_) => 0,
            TargetView::Classes { n_classes, .. } => n_classes,
        };
        let tree = DecisionTree {
            nodes: arena,
            n_predictors: data.predictors.len(),
            n_classes,
        };
        (tree, in_bag)
    }

    fn draw_rows<R: Rng>(&self, n_rows: usize, rng: &mut R) -> Vec<usize> {
        match self.params.sampling {
            Sampling::Bootstrap => (0..self.params.n_samples)
                .map(|_| rng.gen_range(0..n_rows))
                .collect(),
            Sampling::Subsample => {
                rand::seq::index::sample(rng, n_rows, self.params.n_samples).into_vec()
            }
        }
    }

    /// Recursively build the arena-based tree.
    ///
    /// Returns the [`NodeIndex`] of the node just created in `arena`.
    fn build<R: Rng>(
        &self,
        data: &TrainingData<'_>,
        rows: &[usize],
        rng: &mut R,
        arena: &mut Vec<Node>,
    ) -> NodeIndex {
        let n_samples = rows.len();
        let stats = data.target.stats(rows);
        let impurity = stats.impurity();

        let make_leaf = |arena: &mut Vec<Node>| -> NodeIndex {
            let idx = arena.len();
            arena.push(Node::Leaf {
                value: leaf_value(&stats),
                impurity,
                n_samples,
            });
            NodeIndex::new(idx)
        };

        if n_samples < 2 * self.params.leaf_size || data.target.is_constant(rows) {
            return make_leaf(arena);
        }

        let Some(split) = find_best_split(
            &data.predictors,
            &data.target,
            rows,
            &stats,
            self.params.m_try,
            self.params.leaf_size,
            rng,
        ) else {
            return make_leaf(arena);
        };

        // Arena pattern: reserve index, recurse, then overwrite with the split.
        let node_idx = arena.len();
        arena.push(Node::Leaf {
            value: LeafValue::Mean(0.0),
            impurity,
            n_samples,
        });

        let left = self.build(data, &split.left_indices, rng, arena);
        let right = self.build(data, &split.right_indices, rng, arena);

        arena[node_idx] = Node::Split {
            feature: split.feature,
            rule: split.rule,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };

        NodeIndex::new(node_idx)
    }
}

fn leaf_value(stats: &NodeStats) -> LeafValue {
    match stats {
        NodeStats::Moments { .. } => LeafValue::Mean(stats.mean()),
        NodeStats::Counts { n, counts, .. } => {
            let total = (*n).max(1) as f64;
            LeafValue::Classes {
                prediction: modal_class(counts),
                distribution: counts.iter().map(|&c| c as f64 / total).collect(),
            }
        }
    }
}

/// Grow one tree predicting `target` from the other columns of `matrix`.
///
/// # Errors
///
/// Same configuration errors as [`ForestConfig::fit`].
#[instrument(skip_all, fields(n_rows = matrix.n_rows(), target_name = %target))]
pub fn grow_tree<R: Rng>(
    matrix: &FeatureMatrix,
    target: &str,
    config: &ForestConfig,
    rng: &mut R,
) -> Result<(DecisionTree, InBag), ForestError> {
    let params = config.resolve(matrix, target)?;
    let data = TrainingData::new(matrix, target, params.criterion)?;
    Ok(TreeGrower::new(params).grow(&data, rng))
}

/// A grown decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references; split
/// features are positions in the forest's predictor list.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_predictors: usize,
    pub(crate) n_classes: usize,
}

impl DecisionTree {
    /// Walk from the root to a leaf.
    ///
    /// `value_of` returns the row's value (or category code) for a predictor.
    pub fn leaf(&self, value_of: impl Fn(FeatureIndex) -> f64) -> &LeafValue {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return value,
                Node::Split {
                    feature,
                    rule,
                    left,
                    right,
                    ..
                } => {
                    idx = if rule.goes_left(value_of(*feature)) {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Return the nodes in arena order; the root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the number of predictors the tree was grown over.
    #[must_use]
    pub fn n_predictors(&self) -> usize {
        self.n_predictors
    }

    /// Return the number of target classes (0 for a numeric target).
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Compute Mean Decrease in Impurity (MDI) importances.
    ///
    /// Split decreases are summed by predictor and normalized to 1.0; all
    /// zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_predictors];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a single root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }
}

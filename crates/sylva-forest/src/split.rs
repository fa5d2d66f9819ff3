use std::collections::BTreeMap;

use rand::Rng;

use crate::matrix::Feature;
use crate::node::{FeatureIndex, Impurity, SplitRule};

/// Observed categories up to which every two-way partition is scored.
/// Above it, categories are ordered by their target statistic and only
/// prefix partitions are scored.
pub(crate) const MAX_EXHAUSTIVE_CATEGORIES: usize = 10;

/// Splits must remove more than this fraction of the parent's weighted impurity.
const MIN_RELATIVE_DECREASE: f64 = 1e-10;

/// Criterion for measuring the quality of a split on a categorical target.
///
/// Numeric targets always use variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns [`Impurity::new(0.0)`] when `n_samples` is zero (pure node).
    ///
    /// For `Gini`: `1 - Σ(p_i²)` where `p_i = count_i / n_samples`.
    /// For `Entropy`: `-Σ(p_i · ln(p_i))` summed only over classes where `p_i > 0`.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => {
                -class_counts
                    .iter()
                    .filter(|&&c| c > 0)
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p.ln()
                    })
                    .sum::<f64>()
            }
        };
        Impurity::new(value)
    }
}

/// Target column a split is scored against.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TargetView<'a> {
    /// Regression: variance reduction.
    Numeric(&'a [f64]),
    /// Classification: Gini or entropy reduction.
    Classes {
        codes: &'a [usize],
        n_classes: usize,
        criterion: SplitCriterion,
    },
}

impl TargetView<'_> {
    /// Return `true` if every row in `rows` has the same target value.
    pub(crate) fn is_constant(&self, rows: &[usize]) -> bool {
        let Some(&first) = rows.first() else {
            return true;
        };
        match self {
            TargetView::Numeric(values) => rows.iter().all(|&r| values[r] == values[first]),
            TargetView::Classes { codes, .. } => rows.iter().all(|&r| codes[r] == codes[first]),
        }
    }

    /// Accumulate statistics over `rows`.
    ///
    /// Numeric targets are centred on their mean over `rows`, so the sums
    /// stay small when every value carries a large common offset.
    pub(crate) fn stats(&self, rows: &[usize]) -> NodeStats {
        let mut stats = NodeStats::empty(self);
        if let (NodeStats::Moments { shift, .. }, TargetView::Numeric(values)) = (&mut stats, self)
            && !rows.is_empty()
        {
            *shift = rows.iter().map(|&r| values[r]).sum::<f64>() / rows.len() as f64;
        }
        for &row in rows {
            stats.add(self, row);
        }
        stats
    }
}

/// Running sufficient statistics of the target over a set of rows.
///
/// `Moments` sums `y - shift` rather than `y`; statistics that are combined
/// always share the shift of the node they were derived from.
#[derive(Debug, Clone)]
pub(crate) enum NodeStats {
    Moments {
        n: usize,
        shift: f64,
        sum: f64,
        sum_sq: f64,
    },
    Counts {
        n: usize,
        counts: Vec<usize>,
        criterion: SplitCriterion,
    },
}

impl NodeStats {
    pub(crate) fn empty(target: &TargetView<'_>) -> Self {
        match *target {
            TargetView::Numeric(_) => NodeStats::Moments {
                n: 0,
                shift: 0.0,
                sum: 0.0,
                sum_sq: 0.0,
            },
            TargetView::Classes {
                n_classes,
                criterion,
                ..
            } => NodeStats::Counts {
                n: 0,
                counts: vec![0; n_classes],
                criterion,
            },
        }
    }

    pub(crate) fn add(&mut self, target: &TargetView<'_>, row: usize) {
        match (self, target) {
            (NodeStats::Moments { n, shift, sum, sum_sq }, TargetView::Numeric(values)) => {
                let y = values[row] - *shift;
                *n += 1;
                *sum += y;
                *sum_sq += y * y;
            }
            (NodeStats::Counts { n, counts, .. }, TargetView::Classes { codes, .. }) => {
                *n += 1;
                counts[codes[row]] += 1;
            }
            _ => unreachable!("statistics are always built from their own target"),
        }
    }

    pub(crate) fn remove(&mut self, target: &TargetView<'_>, row: usize) {
        match (self, target) {
            (NodeStats::Moments { n, shift, sum, sum_sq }, TargetView::Numeric(values)) => {
                let y = values[row] - *shift;
                *n -= 1;
                *sum -= y;
                *sum_sq -= y * y;
            }
            (NodeStats::Counts { n, counts, .. }, TargetView::Classes { codes, .. }) => {
                *n -= 1;
                counts[codes[row]] -= 1;
            }
            _ => unreachable!("statistics are always built from their own target"),
        }
    }

    /// Empty statistics sharing this node's shift and criterion.
    pub(crate) fn cleared(&self) -> NodeStats {
        match self {
            NodeStats::Moments { shift, .. } => NodeStats::Moments {
                n: 0,
                shift: *shift,
                sum: 0.0,
                sum_sq: 0.0,
            },
            NodeStats::Counts {
                counts, criterion, ..
            } => NodeStats::Counts {
                n: 0,
                counts: vec![0; counts.len()],
                criterion: *criterion,
            },
        }
    }

    fn merge(&mut self, other: &NodeStats) {
        match (self, other) {
            (
                NodeStats::Moments {
                    n, shift, sum, sum_sq,
                },
                NodeStats::Moments {
                    n: on,
                    shift: oshift,
                    sum: osum,
                    sum_sq: osq,
                },
            ) => {
                debug_assert_eq!(shift.to_bits(), oshift.to_bits());
                *n += on;
                *sum += osum;
                *sum_sq += osq;
            }
            (NodeStats::Counts { n, counts, .. }, NodeStats::Counts { n: on, counts: oc, .. }) => {
                *n += on;
                counts.iter_mut().zip(oc).for_each(|(c, o)| *c += o);
            }
            _ => unreachable!("statistics are always built from their own target"),
        }
    }

    pub(crate) fn n(&self) -> usize {
        match self {
            NodeStats::Moments { n, .. } | NodeStats::Counts { n, .. } => *n,
        }
    }

    /// Impurity of the rows: variance, Gini or entropy.
    pub(crate) fn impurity(&self) -> Impurity {
        match self {
            NodeStats::Moments { n, .. } => {
                if *n == 0 {
                    Impurity::new(0.0)
                } else {
                    Impurity::new(self.weighted_impurity() / *n as f64)
                }
            }
            NodeStats::Counts {
                n,
                counts,
                criterion,
            } => criterion.impurity(counts, *n),
        }
    }

    /// Impurity multiplied by the row count (the sum of squared errors for numeric targets).
    pub(crate) fn weighted_impurity(&self) -> f64 {
        match self {
            NodeStats::Moments { n, sum, sum_sq, .. } => {
                if *n == 0 {
                    0.0
                } else {
                    (sum_sq - sum * sum / *n as f64).max(0.0)
                }
            }
            NodeStats::Counts {
                n,
                counts,
                criterion,
            } => *n as f64 * criterion.impurity(counts, *n).value(),
        }
    }

    /// Mean target of the rows; 0 for class counts or no rows.
    pub(crate) fn mean(&self) -> f64 {
        match self {
            NodeStats::Moments { n: 0, .. } | NodeStats::Counts { .. } => 0.0,
            NodeStats::Moments { n, shift, sum, .. } => shift + sum / *n as f64,
        }
    }

    /// Mean target (regression) or modal-class share (classification), used to order categories.
    fn ordering_key(&self, modal_class: usize) -> f64 {
        match self {
            NodeStats::Moments { .. } => self.mean(),
            NodeStats::Counts { n, counts, .. } => counts[modal_class] as f64 / (*n).max(1) as f64,
        }
    }

    fn modal_class(&self) -> usize {
        match self {
            NodeStats::Moments { .. } => 0,
            NodeStats::Counts { counts, .. } => modal_class(counts),
        }
    }
}

/// Return the most frequent class, the lowest code on ties.
pub(crate) fn modal_class(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (class, &count)| {
            if count > best.1 { (class, count) } else { best }
        })
        .0
}

/// The best split of one feature at one node.
#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    pub(crate) rule: SplitRule,
    /// `n·I(parent) - n_l·I(left) - n_r·I(right)`.
    pub(crate) impurity_decrease: f64,
    pub(crate) n_left: usize,
    pub(crate) n_right: usize,
}

/// Score every admissible split of `feature` over `rows` and return the best one.
///
/// Pure function of its inputs. Ties keep the first split point in scan
/// order. Returns `None` when the feature is constant at the node or no
/// split leaves at least `leaf_size` rows on each side.
pub(crate) fn best_split(
    feature: &Feature,
    target: &TargetView<'_>,
    rows: &[usize],
    parent: &NodeStats,
    leaf_size: usize,
) -> Option<SplitCandidate> {
    if rows.len() < 2 {
        return None;
    }
    match (feature.numeric_values(), feature.codes()) {
        (Some(values), _) => best_numeric_split(values, target, rows, parent, leaf_size),
        (_, Some(codes)) => best_categorical_split(codes, target, rows, parent, leaf_size),
        _ => None,
    }
}

fn best_numeric_split(
    values: &[f64],
    target: &TargetView<'_>,
    rows: &[usize],
    parent: &NodeStats,
    leaf_size: usize,
) -> Option<SplitCandidate> {
    let n_samples = rows.len();
    let parent_weighted = parent.weighted_impurity();

    let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (values[r], r)).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Incremental scan: left grows from empty, right shrinks from full.
    let mut left = parent.cleared();
    let mut right = parent.clone();
    let mut best: Option<SplitCandidate> = None;

    for i in 0..(n_samples - 1) {
        let (val_i, row) = sorted[i];
        left.add(target, row);
        right.remove(target, row);

        let val_next = sorted[i + 1].0;
        if val_i == val_next {
            continue;
        }

        let n_left = i + 1;
        let n_right = n_samples - n_left;
        if n_left < leaf_size || n_right < leaf_size {
            continue;
        }

        let decrease = parent_weighted - left.weighted_impurity() - right.weighted_impurity();
        if best.as_ref().is_none_or(|b| decrease > b.impurity_decrease) {
            let mid = (val_i + val_next) / 2.0;
            // Adjacent floats can round the midpoint up onto the right-hand value.
            let threshold = if mid < val_next { mid } else { val_i };
            best = Some(SplitCandidate {
                rule: SplitRule::Threshold(threshold),
                impurity_decrease: decrease,
                n_left,
                n_right,
            });
        }
    }

    best
}

fn best_categorical_split(
    codes: &[usize],
    target: &TargetView<'_>,
    rows: &[usize],
    parent: &NodeStats,
    leaf_size: usize,
) -> Option<SplitCandidate> {
    let mut groups: BTreeMap<usize, NodeStats> = BTreeMap::new();
    for &row in rows {
        groups
            .entry(codes[row])
            .or_insert_with(|| parent.cleared())
            .add(target, row);
    }
    if groups.len() < 2 {
        return None;
    }

    let mut categories: Vec<(usize, NodeStats)> = groups.into_iter().collect();
    let parent_weighted = parent.weighted_impurity();
    let mut best: Option<SplitCandidate> = None;

    let mut consider = |left_mask: &[bool], categories: &[(usize, NodeStats)]| {
        let mut left = parent.cleared();
        let mut right = parent.cleared();
        for (&goes_left, (_, stats)) in left_mask.iter().zip(categories) {
            if goes_left {
                left.merge(stats);
            } else {
                right.merge(stats);
            }
        }
        let (n_left, n_right) = (left.n(), right.n());
        if n_left < leaf_size || n_right < leaf_size {
            return;
        }
        let decrease = parent_weighted - left.weighted_impurity() - right.weighted_impurity();
        if best.as_ref().is_none_or(|b| decrease > b.impurity_decrease) {
            let mut left_codes: Vec<usize> = left_mask
                .iter()
                .zip(categories)
                .filter(|&(&goes_left, _)| goes_left)
                .map(|(_, (code, _))| *code)
                .collect();
            left_codes.sort_unstable();
            best = Some(SplitCandidate {
                rule: SplitRule::Categories(left_codes),
                impurity_decrease: decrease,
                n_left,
                n_right,
            });
        }
    };

    let k = categories.len();
    if k <= MAX_EXHAUSTIVE_CATEGORIES {
        // The last category always stays right so mirrored partitions are scored once.
        let mut mask = vec![false; k];
        for subset in 1u32..(1u32 << (k - 1)) {
            for (bit, slot) in mask.iter_mut().enumerate().take(k - 1) {
                *slot = subset & (1 << bit) != 0;
            }
            consider(&mask, &categories);
        }
    } else {
        let modal = parent.modal_class();
        categories.sort_by(|a, b| {
            a.1.ordering_key(modal)
                .total_cmp(&b.1.ordering_key(modal))
                .then(a.0.cmp(&b.0))
        });
        let mut mask = vec![false; k];
        for prefix in 0..(k - 1) {
            mask[prefix] = true;
            consider(&mask, &categories);
        }
    }

    best
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Predictor used for the split.
    pub(crate) feature: FeatureIndex,
    /// Routing rule.
    pub(crate) rule: SplitRule,
    /// Weighted impurity decrease from this split.
    pub(crate) impurity_decrease: f64,
    /// Rows going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Rows going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among `m_try` randomly drawn predictors.
///
/// Candidates are drawn without replacement (partial Fisher-Yates) and
/// scored in draw order; the first strictly best (feature, split) wins.
/// Returns `None` when no admissible split removes impurity.
pub(crate) fn find_best_split(
    predictors: &[&Feature],
    target: &TargetView<'_>,
    rows: &[usize],
    parent: &NodeStats,
    m_try: usize,
    leaf_size: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_predictors = predictors.len();
    if rows.is_empty() || n_predictors == 0 {
        return None;
    }

    let mut feature_order: Vec<usize> = (0..n_predictors).collect();
    let take = m_try.min(n_predictors);
    for i in 0..take {
        let j = rng.gen_range(i..n_predictors);
        feature_order.swap(i, j);
    }

    let mut best: Option<(usize, SplitCandidate)> = None;
    for &feat_idx in &feature_order[..take] {
        let Some(candidate) = best_split(predictors[feat_idx], target, rows, parent, leaf_size)
        else {
            continue;
        };
        if best
            .as_ref()
            .is_none_or(|(_, b)| candidate.impurity_decrease > b.impurity_decrease)
        {
            best = Some((feat_idx, candidate));
        }
    }

    let (feat_idx, candidate) = best?;
    if candidate.impurity_decrease <= parent.weighted_impurity() * MIN_RELATIVE_DECREASE {
        return None;
    }

    let feature = predictors[feat_idx];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&row| candidate.rule.goes_left(feature.value(row)));
    debug_assert_eq!(
        (left_indices.len(), right_indices.len()),
        (candidate.n_left, candidate.n_right)
    );
    debug_assert!(candidate.n_left >= leaf_size && candidate.n_right >= leaf_size);

    Some(SplitResult {
        feature: FeatureIndex::new(feat_idx),
        rule: candidate.rule,
        impurity_decrease: candidate.impurity_decrease,
        left_indices,
        right_indices,
    })
}

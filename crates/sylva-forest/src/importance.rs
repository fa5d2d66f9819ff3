//! Impurity importance aggregation across trees.

/// A predictor with its normalized importance and rank.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedFeature {
    /// Predictor name.
    pub name: String,
    /// Normalized importance (sums to 1.0 across predictors unless no tree split).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Sum per-tree MDI vectors, normalize, and rank descending.
///
/// Equal importances keep predictor order.
pub(crate) fn aggregate_importances(per_tree: &[Vec<f64>], names: &[String]) -> Vec<RankedFeature> {
    if per_tree.is_empty() || names.is_empty() {
        return vec![];
    }

    let mut totals = vec![0.0f64; names.len()];
    for tree_imp in per_tree {
        totals
            .iter_mut()
            .zip(tree_imp)
            .for_each(|(total, val)| *total += val);
    }

    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|v| *v /= sum);
    }

    let mut ranked: Vec<RankedFeature> = names
        .iter()
        .zip(totals)
        .map(|(name, importance)| RankedFeature {
            name: name.clone(),
            importance,
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, feat) in ranked.iter_mut().enumerate() {
        feat.rank = i + 1;
    }

    ranked
}

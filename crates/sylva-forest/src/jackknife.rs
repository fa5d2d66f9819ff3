//! Infinitesimal jackknife variance of bagged predictions.

use rayon::iter::{IntoParallelRefIterator, IndexedParallelIterator, ParallelIterator};
use tracing::{info, instrument};

use crate::error::ForestError;
use crate::forest::RandomForest;
use crate::matrix::FeatureMatrix;
use crate::predict::Response;

/// Ensemble prediction with its jackknife variance estimate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Prediction {
    /// Mean of the per-tree predictions.
    pub value: f64,
    /// Bias-corrected variance, never negative.
    pub variance: f64,
}

fn check_shape(
    context: &'static str,
    table: &[Vec<f64>],
    n_cases: usize,
    n_trees: usize,
) -> Result<(), ForestError> {
    let ragged = table.iter().find(|row| row.len() != n_trees);
    if table.len() != n_cases || ragged.is_some() {
        return Err(ForestError::ShapeMismatch {
            context,
            expected_rows: n_cases,
            expected_cols: n_trees,
            got_rows: table.len(),
            got_cols: ragged.map_or(n_trees, Vec::len),
        });
    }
    Ok(())
}

/// Estimate per-case prediction variance from per-tree predictions and in-bag counts.
///
/// Both tables have one row per case and one column per tree. With `B`
/// trees, the value is the mean prediction and the variance is
/// `(Σ_b (N_ib − N̄_b)(p_ib − value_i))² / B²` minus the Monte-Carlo
/// correction `boot_var_i · n̄ / B`, clamped at zero, where `N̄_b` is tree
/// `b`'s mean in-bag count and `n̄` the mean of those. Cases run in parallel.
///
/// # Errors
///
/// | Variant                           | When                                              |
/// |-----------------------------------|---------------------------------------------------|
/// | [`ForestError::EmptyDataset`]     | zero cases or zero trees                          |
/// | [`ForestError::ShapeMismatch`]    | ragged rows or the two tables differ in shape     |
#[instrument(skip_all, fields(n_cases = predictions.len()))]
pub fn jackknife(
    predictions: &[Vec<f64>],
    in_bag: &[Vec<f64>],
) -> Result<Vec<Prediction>, ForestError> {
    let n_cases = predictions.len();
    let n_trees = predictions.first().map_or(0, Vec::len);
    if n_cases == 0 || n_trees == 0 {
        return Err(ForestError::EmptyDataset);
    }
    check_shape("jackknife predictions", predictions, n_cases, n_trees)?;
    check_shape("jackknife in-bag counts", in_bag, n_cases, n_trees)?;

    let b = n_trees as f64;
    let mut tree_means = vec![0.0f64; n_trees];
    for row in in_bag {
        tree_means
            .iter_mut()
            .zip(row)
            .for_each(|(mean, &count)| *mean += count);
    }
    tree_means.iter_mut().for_each(|m| *m /= n_cases as f64);
    let overall_mean = tree_means.iter().sum::<f64>() / b;

    info!(n_cases, n_trees, mean_in_bag = overall_mean, "computing jackknife variance");

    let estimates: Vec<Prediction> = predictions
        .par_iter()
        .zip(in_bag.par_iter())
        .map(|(preds, counts)| {
            let first = preds[0];
            if preds.iter().all(|&p| p == first) {
                return Prediction {
                    value: first,
                    variance: 0.0,
                };
            }

            let value = preds.iter().sum::<f64>() / b;
            let (covariance, sum_sq) = preds
                .iter()
                .zip(counts)
                .zip(&tree_means)
                .fold((0.0, 0.0), |(cov, sq), ((&p, &n), &n_bar)| {
                    let centred = p - value;
                    (cov + (n - n_bar) * centred, sq + centred * centred)
                });

            let raw = covariance * covariance / (b * b);
            let boot_var = sum_sq / b;
            let correction = boot_var * overall_mean / b;
            Prediction {
                value,
                variance: (raw - correction).max(0.0),
            }
        })
        .collect();

    Ok(estimates)
}

impl RandomForest {
    /// Jackknife variance of `response` for each training row.
    ///
    /// `matrix` must be the training matrix: the in-bag table has one row per
    /// training row.
    ///
    /// # Errors
    ///
    /// As [`jackknife`] and [`RandomForest::tree_responses`].
    pub fn jackknife(
        &self,
        matrix: &FeatureMatrix,
        response: Response,
    ) -> Result<Vec<Prediction>, ForestError> {
        let predictions = self.tree_responses(matrix, response)?;
        jackknife(&predictions, &self.in_bag_matrix())
    }
}

//! Partial dependence of a model's prediction on one or two features.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::forest::RandomForest;
use crate::matrix::FeatureMatrix;
use crate::predict::Response;

/// Compute partial dependence of `predict` on the named features.
///
/// The grid is the sorted distinct values of each named column (category
/// codes for categorical columns), taken as a Cartesian product ordered by
/// the first feature, then the second. For each grid point the named columns
/// are overwritten with the grid values and `predict` is averaged over all
/// rows. Each output row is `[grid value(s)..., mean prediction]`, in grid
/// order. Grid points are evaluated in parallel.
///
/// # Errors
///
/// | Variant                              | When                                              |
/// |--------------------------------------|---------------------------------------------------|
/// | [`ForestError::InvalidArity`]        | not exactly 1 or 2 names                          |
/// | [`ForestError::UnknownFeature`]      | a name is not a column of `matrix`                |
/// | [`ForestError::DuplicateFeature`]    | the same name is given twice                      |
/// | [`ForestError::ShapeMismatch`]       | `predict` returns other than one value per row    |
///
/// Errors from `predict` itself are passed through.
#[instrument(skip_all, fields(features = ?feature_names, n_rows = matrix.n_rows()))]
pub fn partial_dependence<F>(
    predict: F,
    matrix: &FeatureMatrix,
    feature_names: &[&str],
) -> Result<Vec<Vec<f64>>, ForestError>
where
    F: Fn(&FeatureMatrix) -> Result<Vec<f64>, ForestError> + Sync,
{
    if !(1..=2).contains(&feature_names.len()) {
        return Err(ForestError::InvalidArity {
            got: feature_names.len(),
        });
    }

    let columns: Vec<usize> = feature_names
        .iter()
        .map(|&name| {
            matrix
                .feature_index(name)
                .ok_or_else(|| ForestError::UnknownFeature {
                    name: name.to_string(),
                })
        })
        .collect::<Result<_, _>>()?;
    if columns.len() == 2 && columns[0] == columns[1] {
        return Err(ForestError::DuplicateFeature {
            name: feature_names[0].to_string(),
        });
    }

    let grids: Vec<Vec<f64>> = columns
        .iter()
        .map(|&c| matrix.features()[c].distinct_values())
        .collect();
    let points = cartesian_product(&grids);

    info!(grid_size = points.len(), "computing partial dependence");

    let n_rows = matrix.n_rows();
    let rows: Vec<Vec<f64>> = points
        .into_par_iter()
        .map(|point| {
            let replacements: Vec<(usize, f64)> =
                columns.iter().copied().zip(point.iter().copied()).collect();
            let modified = matrix.with_constant_columns(&replacements);
            let predictions = predict(&modified)?;
            if predictions.len() != n_rows {
                return Err(ForestError::ShapeMismatch {
                    context: "partial dependence predictions",
                    expected_rows: n_rows,
                    expected_cols: 1,
                    got_rows: predictions.len(),
                    got_cols: 1,
                });
            }
            let mean = predictions.iter().sum::<f64>() / n_rows as f64;
            debug!(?point, mean, "grid point evaluated");
            let mut row = point;
            row.push(mean);
            Ok(row)
        })
        .collect::<Result<_, _>>()?;

    Ok(rows)
}

fn cartesian_product(grids: &[Vec<f64>]) -> Vec<Vec<f64>> {
    grids.iter().fold(vec![Vec::new()], |acc, grid| {
        acc.iter()
            .flat_map(|prefix| {
                grid.iter().map(move |&value| {
                    let mut point = prefix.clone();
                    point.push(value);
                    point
                })
            })
            .collect()
    })
}

impl RandomForest {
    /// Partial dependence of this forest's `response` on the named features.
    ///
    /// # Errors
    ///
    /// As [`partial_dependence`] and [`RandomForest::predict_response`].
    pub fn partial_dependence(
        &self,
        matrix: &FeatureMatrix,
        feature_names: &[&str],
        response: Response,
    ) -> Result<Vec<Vec<f64>>, ForestError> {
        partial_dependence(
            |m| self.predict_response(m, response),
            matrix,
            feature_names,
        )
    }
}

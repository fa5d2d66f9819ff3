//! Out-of-bag (OOB) evaluation.

use crate::error::ForestError;
use crate::forest::RandomForest;
use crate::matrix::FeatureMatrix;

/// OOB quality measure, by target kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum OobMetric {
    /// Categorical target.
    Accuracy {
        /// Fraction of OOB rows whose predicted class is correct.
        accuracy: f64,
        /// `confusion_matrix[true][predicted]`.
        confusion_matrix: Vec<Vec<usize>>,
    },
    /// Numeric target.
    Regression {
        /// Mean squared error of the OOB predictions.
        mse: f64,
        /// `1 - SSE / SST` over the OOB rows; 0 when their target is constant.
        r_squared: f64,
    },
}

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OobScore {
    /// Number of rows that had at least one OOB tree.
    pub n_oob_samples: usize,
    /// Accuracy or regression error.
    pub metric: OobMetric,
}

impl OobScore {
    /// Error rate (1 - accuracy) for classification, MSE for regression.
    #[must_use]
    pub fn error(&self) -> f64 {
        match &self.metric {
            OobMetric::Accuracy { accuracy, .. } => 1.0 - accuracy,
            OobMetric::Regression { mse, .. } => *mse,
        }
    }
}

/// Score each training row with the trees that left it out of bag.
///
/// Rows drawn by every tree are skipped.
pub(crate) fn compute_oob(
    forest: &RandomForest,
    matrix: &FeatureMatrix,
) -> Result<OobScore, ForestError> {
    let predictions = forest.predict_oob_batch(matrix)?;
    let target = matrix.feature(&forest.target().name)?;

    let scored: Vec<(usize, f64)> = predictions
        .iter()
        .enumerate()
        .filter_map(|(row, pred)| pred.map(|p| (row, p)))
        .collect();

    let n_oob_samples = scored.len();
    if n_oob_samples == 0 {
        return Err(ForestError::OobEvaluationFailed {
            reason: "no row has any OOB tree".to_string(),
        });
    }

    let metric = if forest.is_classification() {
        let n_classes = forest.n_classes();
        let mut confusion = vec![vec![0usize; n_classes]; n_classes];
        let mut correct = 0usize;
        for &(row, pred) in &scored {
            let truth = target.code(row).unwrap_or(0);
            let predicted = pred as usize;
            confusion[truth][predicted] += 1;
            if truth == predicted {
                correct += 1;
            }
        }
        OobMetric::Accuracy {
            accuracy: correct as f64 / n_oob_samples as f64,
            confusion_matrix: confusion,
        }
    } else {
        let n = n_oob_samples as f64;
        let mean = scored.iter().map(|&(row, _)| target.value(row)).sum::<f64>() / n;
        let (sse, sst) = scored.iter().fold((0.0, 0.0), |(sse, sst), &(row, pred)| {
            let y = target.value(row);
            (sse + (y - pred).powi(2), sst + (y - mean).powi(2))
        });
        OobMetric::Regression {
            mse: sse / n,
            r_squared: if sst > 0.0 { 1.0 - sse / sst } else { 0.0 },
        }
    };

    Ok(OobScore {
        n_oob_samples,
        metric,
    })
}

//! Random forests over mixed numeric and categorical features.
//!
//! Grows CART trees on bootstrap or sub-sampled rows in parallel via rayon,
//! predicts numeric or categorical targets, and adds two diagnostics:
//! partial dependence plots and infinitesimal-jackknife variance estimates.
//! Out-of-bag scoring and impurity importances come with every growth run.

mod config;
mod error;
mod forest;
mod importance;
mod jackknife;
mod matrix;
mod node;
mod oob;
mod pdp;
mod predict;
mod result;
mod split;
mod tree;

pub use config::{ForestConfig, MTry, OobMode, Sampling};
pub use error::ForestError;
pub use forest::{ColumnSchema, RandomForest, grow_forest};
pub use importance::RankedFeature;
pub use jackknife::{Prediction, jackknife};
pub use matrix::{Feature, FeatureKind, FeatureMatrix};
pub use node::{FeatureIndex, Impurity, LeafValue, Node, NodeIndex, SplitRule};
pub use oob::{OobMetric, OobScore};
pub use pdp::partial_dependence;
pub use predict::{ClassDistribution, Response};
pub use result::{ForestResult, TrainingMetadata};
pub use split::SplitCriterion;
pub use tree::{DecisionTree, InBag, grow_tree};

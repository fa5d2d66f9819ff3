use std::fmt;

/// Zero-based position in a forest's predictor list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based predictor position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based predictor position.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node impurity: variance for numeric targets, Gini or entropy for categorical ones.
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Routing rule of an interior node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitRule {
    /// Numeric feature: rows with `value <= threshold` go left.
    Threshold(f64),
    /// Categorical feature: rows whose code is in this sorted set go left.
    Categories(Vec<usize>),
}

impl SplitRule {
    /// Return `true` if a row with this value (number or category code) goes left.
    #[must_use]
    pub fn goes_left(&self, value: f64) -> bool {
        match self {
            SplitRule::Threshold(threshold) => value <= *threshold,
            SplitRule::Categories(left) => left.binary_search(&(value as usize)).is_ok(),
        }
    }
}

/// Prediction stored in a leaf.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LeafValue {
    /// Mean target of the rows that reached the leaf.
    Mean(f64),
    /// Class distribution of the rows that reached the leaf.
    Classes {
        /// Modal class (lowest code on ties).
        prediction: usize,
        /// Normalized class probability distribution.
        distribution: Vec<f64>,
    },
}

impl LeafValue {
    /// Return the scalar leaf value: the mean, or the modal class code as `f64`.
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            LeafValue::Mean(mean) => *mean,
            LeafValue::Classes { prediction, .. } => *prediction as f64,
        }
    }
}

/// A node in a decision tree arena.
///
/// Trees are stored as `Vec<Node>` where children are referenced by
/// [`NodeIndex`] rather than pointers. The root is at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Predictor used for the split.
        feature: FeatureIndex,
        /// How rows are routed to the children.
        rule: SplitRule,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training rows (with bootstrap multiplicity) that reached this node.
        n_samples: usize,
        /// Weighted decrease in impurity from this split.
        impurity_decrease: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Leaf prediction.
        value: LeafValue,
        /// Impurity at this leaf.
        impurity: Impurity,
        /// Number of training rows (with bootstrap multiplicity) in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training rows that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, LeafValue, Node, NodeIndex, SplitRule};

    #[test]
    fn feature_index_roundtrip() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_ordering() {
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
    }

    #[test]
    fn impurity_display() {
        assert_eq!(format!("{}", Impurity::new(0.333333)), "0.333333");
    }

    #[test]
    fn threshold_rule_is_inclusive() {
        let rule = SplitRule::Threshold(2.5);
        assert!(rule.goes_left(2.5));
        assert!(rule.goes_left(-1.0));
        assert!(!rule.goes_left(2.6));
    }

    #[test]
    fn category_rule_membership() {
        let rule = SplitRule::Categories(vec![0, 3]);
        assert!(rule.goes_left(0.0));
        assert!(rule.goes_left(3.0));
        assert!(!rule.goes_left(1.0));
        // unseen code
        assert!(!rule.goes_left(9.0));
    }

    #[test]
    fn leaf_value_scalar() {
        assert!((LeafValue::Mean(4.5).value() - 4.5).abs() < f64::EPSILON);
        let classes = LeafValue::Classes {
            prediction: 2,
            distribution: vec![0.1, 0.2, 0.7],
        };
        assert!((classes.value() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn node_accessors() {
        let leaf = Node::Leaf {
            value: LeafValue::Mean(1.0),
            impurity: Impurity::new(0.32),
            n_samples: 10,
        };
        let split = Node::Split {
            feature: FeatureIndex::new(2),
            rule: SplitRule::Threshold(3.5),
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            impurity: Impurity::new(0.48),
            n_samples: 20,
            impurity_decrease: 0.16,
        };
        assert!(leaf.is_leaf());
        assert!(!split.is_leaf());
        assert_eq!(leaf.n_samples(), 10);
        assert_eq!(split.n_samples(), 20);
        assert!((split.impurity().value() - 0.48).abs() < f64::EPSILON);
    }
}

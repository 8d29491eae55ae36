//! Gradient-boosted regression trees (squared error, no subsampling)

use super::{Explanation, Regressor};
use crate::config::BoostingConfig;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &ArrayView1<f64>) -> f64 {
        match self {
            Node::Leaf(v) => *v,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    residuals: &'a Array1<f64>,
    max_depth: usize,
    min_leaf: usize,
    /// Squared-error reduction per feature
    gains: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, idx: &[usize], depth: usize) -> Node {
        let sum: f64 = idx.iter().map(|&i| self.residuals[i]).sum();
        let leaf = Node::Leaf(if idx.is_empty() { 0.0 } else { sum / idx.len() as f64 });

        if depth >= self.max_depth || idx.len() < 2 * self.min_leaf {
            return leaf;
        }
        let Some(best) = self.best_split(idx) else {
            return leaf;
        };

        self.gains[best.feature] += best.gain;
        let (l, r): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .copied()
            .partition(|&i| self.x[[i, best.feature]] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(&l, depth + 1)),
            right: Box::new(self.build(&r, depth + 1)),
        }
    }

    /// Exhaustive search; ties keep the lowest feature index and threshold
    fn best_split(&self, idx: &[usize]) -> Option<BestSplit> {
        let n = idx.len();
        let total: f64 = idx.iter().map(|&i| self.residuals[i]).sum();
        let parent_sse_term = total * total / n as f64;
        let n_features = self.x.ncols();

        let mut best: Option<BestSplit> = None;
        for f in 0..n_features {
            let mut order = idx.to_vec();
            order.sort_by(|&a, &b| self.x[[a, f]].total_cmp(&self.x[[b, f]]));

            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += self.residuals[order[k]];
                let left_n = k + 1;
                let right_n = n - left_n;
                if left_n < self.min_leaf || right_n < self.min_leaf {
                    continue;
                }
                let (lo, hi) = (self.x[[order[k], f]], self.x[[order[k + 1], f]]);
                if lo == hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_sse_term;
                if gain > 1e-15 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature: f,
                        threshold: (lo + hi) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostingRegressor {
    init: f64,
    learning_rate: f64,
    trees: Vec<Node>,
    /// Normalised to sum to 1, or all zero when no split was made
    importances: Vec<f64>,
}

impl GradientBoostingRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, config: &BoostingConfig) -> Result<Self> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(PipelineError::DimensionMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        let n_features = x.ncols();
        let init = y.mean().unwrap_or(0.0);
        let mut fitted = Array1::from_elem(y.len(), init);
        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut gains = vec![0.0; n_features];
        let all: Vec<usize> = (0..y.len()).collect();

        for _ in 0..config.n_estimators {
            let residuals = y - &fitted;
            let mut builder = TreeBuilder {
                x,
                residuals: &residuals,
                max_depth: config.max_depth,
                min_leaf: config.min_samples_leaf.max(1),
                gains: vec![0.0; n_features],
            };
            let tree = builder.build(&all, 0);
            for (g, t) in gains.iter_mut().zip(&builder.gains) {
                *g += t;
            }
            for (f, row) in fitted.iter_mut().zip(x.rows()) {
                *f += config.learning_rate * tree.predict(&row);
            }
            trees.push(tree);
        }

        if fitted.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::SingularMatrix("gradient boosting"));
        }

        let total: f64 = gains.iter().sum();
        let importances = if total > 0.0 {
            gains.iter().map(|g| g / total).collect()
        } else {
            gains
        };

        Ok(Self {
            init,
            learning_rate: config.learning_rate,
            trees,
            importances,
        })
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostingRegressor {
    fn predict(&self, x: &[f64]) -> f64 {
        let row = ArrayView1::from(x);
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict(&row)).sum::<f64>()
    }

    fn explanation(&self) -> Explanation {
        Explanation::Importances(self.importances.clone())
    }
}

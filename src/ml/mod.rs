//! Estimators used by the per-ticker models
//!
//! - Median imputation and standard scaling fitted on training rows
//! - Ridge regression (default) or gradient-boosted trees for magnitude
//! - L2 logistic regression for direction, with a constant fallback

pub mod boosting;
pub mod linalg;
pub mod linear;
pub mod preprocess;


pub use boosting::GradientBoostingRegressor;
pub use linear::{ConstantClassifier, LogisticClassifier, RidgeRegressor};
pub use preprocess::{EmptyColumn, MedianImputer, Preprocessor, StandardScaler, Transformed};

/// How a regressor's output can be attributed to its inputs
#[derive(Debug, Clone, PartialEq)]
pub enum Explanation {
    /// Linear coefficients, one per feature
    Coefficients(Vec<f64>),
    /// Global importances, one per feature
    Importances(Vec<f64>),
}

/// Predicts the signed intraday return from a weighted, scaled row
#[cfg_attr(test, mockall::automock)]
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &[f64]) -> f64;

    fn explanation(&self) -> Explanation;
}

/// Predicts P(return > 0) from a weighted, scaled row
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send + Sync {
    fn prob_up(&self, x: &[f64]) -> f64;
}

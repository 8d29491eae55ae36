//! Linear estimators: ridge regression and L2 logistic regression

use super::linalg::solve;
use super::{Classifier, Explanation, Regressor};
use crate::error::{PipelineError, Result};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

/// Ridge regression with an unpenalised intercept
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeRegressor {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl RidgeRegressor {
    /// Solves `(XcᵀXc + αI) β = Xcᵀyc` on centred data
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Self> {
        check_shape(x, y.len())?;

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or(PipelineError::SingularMatrix("ridge"))?;
        let y_mean = y.mean().ok_or(PipelineError::SingularMatrix("ridge"))?;
        let xc = x - &x_mean;
        let yc = y - y_mean;

        let mut gram = xc.t().dot(&xc);
        gram.diag_mut().mapv_inplace(|d| d + alpha);
        let rhs = xc.t().dot(&yc);

        let coefficients = solve(&gram, &rhs, "ridge")?;
        let intercept = y_mean - x_mean.dot(&coefficients);

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for RidgeRegressor {
    fn predict(&self, x: &[f64]) -> f64 {
        self.intercept + self.coefficients.dot(&ArrayView1::from(x))
    }

    fn explanation(&self) -> Explanation {
        Explanation::Coefficients(self.coefficients.to_vec())
    }
}

/// Binary logistic regression, L2-penalised, fitted by Newton/IRLS.
///
/// Minimises `C · Σ logloss + ½‖w‖²`; the intercept is not penalised.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticClassifier {
    coefficients: Array1<f64>,
    intercept: f64,
    iterations: usize,
}

impl LogisticClassifier {
    pub fn fit(x: &Array2<f64>, labels: &[bool], c: f64, max_iter: usize) -> Result<Self> {
        check_shape(x, labels.len())?;
        let (n, p) = x.dim();

        // Last column is the intercept
        let design = Array2::from_shape_fn((n, p + 1), |(i, j)| if j < p { x[[i, j]] } else { 1.0 });
        let y: Array1<f64> = labels.iter().map(|l| if *l { 1.0 } else { 0.0 }).collect();
        let mut w = Array1::<f64>::zeros(p + 1);
        let mut iterations = 0;

        for iter in 0..max_iter {
            iterations = iter + 1;
            let prob = design.dot(&w).mapv(sigmoid);
            let curvature = prob.mapv(|q| (q * (1.0 - q)).max(1e-12));

            let mut grad = design.t().dot(&(&prob - &y)) * c;
            let weighted = &design * &curvature.view().insert_axis(Axis(1));
            let mut hess = design.t().dot(&weighted) * c;
            for i in 0..p {
                grad[i] += w[i];
                hess[[i, i]] += 1.0;
            }

            let step = solve(&hess, &grad, "logistic")?;
            w -= &step;

            if step.iter().all(|s| s.abs() < 1e-10) {
                break;
            }
        }

        if w.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::SingularMatrix("logistic"));
        }

        Ok(Self {
            coefficients: w.slice(s![..p]).to_owned(),
            intercept: w[p],
            iterations,
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl Classifier for LogisticClassifier {
    fn prob_up(&self, x: &[f64]) -> f64 {
        sigmoid(self.intercept + self.coefficients.dot(&ArrayView1::from(x)))
    }
}

/// Fixed probability, used when training labels have a single class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantClassifier {
    pub probability: f64,
}

impl Classifier for ConstantClassifier {
    fn prob_up(&self, _x: &[f64]) -> f64 {
        self.probability
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn check_shape(x: &Array2<f64>, n_targets: usize) -> Result<()> {
    if x.nrows() != n_targets {
        return Err(PipelineError::DimensionMismatch {
            expected: x.nrows(),
            actual: n_targets,
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::DimensionMismatch {
            expected: 1,
            actual: 0,
        });
    }
    Ok(())
}

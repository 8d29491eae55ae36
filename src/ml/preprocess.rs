//! Median imputation, standard scaling and the weighted model-input transform

use crate::data::quantile_sorted;
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};

/// A column with no finite training value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyColumn(pub usize);

/// Per-column median of the training rows, used to fill NaN
#[derive(Debug, Clone, PartialEq)]
pub struct MedianImputer {
    medians: Array1<f64>,
}

impl MedianImputer {
    pub fn fit(x: &Array2<f64>) -> Result<Self, EmptyColumn> {
        let mut medians = Array1::zeros(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let mut col: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            if col.is_empty() {
                return Err(EmptyColumn(j));
            }
            col.sort_by(f64::total_cmp);
            medians[j] = quantile_sorted(&col, 0.5);
        }
        Ok(Self { medians })
    }

    pub fn transform(&self, row: ArrayView1<f64>) -> Array1<f64> {
        Zip::from(&row)
            .and(&self.medians)
            .map_collect(|v, m| if v.is_finite() { *v } else { *m })
    }

    pub fn transform_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            Zip::from(&mut row).and(&self.medians).for_each(|v, m| {
                if !v.is_finite() {
                    *v = *m;
                }
            });
        }
        out
    }

    pub fn medians(&self) -> &Array1<f64> {
        &self.medians
    }
}

/// Zero mean, unit population variance per column; constant columns keep scale 1
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON && s.is_finite() { s } else { 1.0 });
        Self { means, scales }
    }

    pub fn transform(&self, row: ArrayView1<f64>) -> Array1<f64> {
        (&row - &self.means) / &self.scales
    }

    pub fn transform_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.scales
    }
}

/// A row after preprocessing
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// Clipped z-scores, before importance weighting
    pub z: Vec<f64>,
    /// `z` multiplied by the model-input weights; what the estimators see
    pub weighted: Vec<f64>,
}

/// Imputer → scaler → clip → weight, fitted on training rows only
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    imputer: MedianImputer,
    scaler: StandardScaler,
    clip: f64,
    weights: Array1<f64>,
}

impl Preprocessor {
    pub fn fit(x: &Array2<f64>, weights: Array1<f64>, clip: f64) -> Result<Self, EmptyColumn> {
        let imputer = MedianImputer::fit(x)?;
        let scaler = StandardScaler::fit(&imputer.transform_matrix(x));
        Ok(Self {
            imputer,
            scaler,
            clip,
            weights,
        })
    }

    pub fn transform(&self, row: &[f64]) -> Transformed {
        let filled = self.imputer.transform(ArrayView1::from(row));
        let z = self
            .scaler
            .transform(filled.view())
            .mapv(|v| v.clamp(-self.clip, self.clip));
        let weighted = &z * &self.weights;
        Transformed {
            z: z.to_vec(),
            weighted: weighted.to_vec(),
        }
    }

    /// Weighted model inputs for a whole design matrix
    pub fn transform_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let clip = self.clip;
        let z = self
            .scaler
            .transform_matrix(&self.imputer.transform_matrix(x))
            .mapv(|v| v.clamp(-clip, clip));
        z * &self.weights
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }
}

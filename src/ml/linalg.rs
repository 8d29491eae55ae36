//! Dense linear solve for the normal equations and Newton steps

use crate::error::{PipelineError, Result};
use ndarray::{s, Array1, Array2};

const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `a · x = b` by Gauss-Jordan elimination with partial pivoting
pub fn solve(a: &Array2<f64>, b: &Array1<f64>, what: &'static str) -> Result<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(PipelineError::DimensionMismatch {
            expected: n,
            actual: a.ncols(),
        });
    }
    if b.len() != n {
        return Err(PipelineError::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    // Augmented matrix [A | b]
    let mut aug = Array2::<f64>::zeros((n, n + 1));
    aug.slice_mut(s![.., ..n]).assign(a);
    aug.column_mut(n).assign(b);

    for col in 0..n {
        let (max_row, max_val) = (col..n).fold((col, aug[[col, col]].abs()), |best, row| {
            let v = aug[[row, col]].abs();
            if v > best.1 {
                (row, v)
            } else {
                best
            }
        });

        if !max_val.is_finite() || max_val < PIVOT_TOLERANCE {
            return Err(PipelineError::SingularMatrix(what));
        }

        if max_row != col {
            for k in 0..=n {
                aug.swap([col, k], [max_row, k]);
            }
        }

        let pivot = aug[[col, col]];
        aug.row_mut(col).mapv_inplace(|v| v / pivot);

        let pivot_row = aug.row(col).to_owned();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[[row, col]];
            if factor != 0.0 {
                aug.row_mut(row).scaled_add(-factor, &pivot_row);
            }
        }
    }

    let x = aug.column(n).to_owned();
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(PipelineError::SingularMatrix(what))
    }
}

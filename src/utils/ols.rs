//! Penalized least squares used to estimate trend, seasonality and holiday
//! coefficients in one linear system.

use crate::error::{Result, TrafficError};

/// Coefficients of a penalized least-squares fit, one per design column.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeResult {
    pub coefficients: Vec<f64>,
}

impl RidgeResult {
    /// Evaluate `X @ beta` for design columns laid out like the fitted ones.
    pub fn predict(&self, columns: &[Vec<f64>]) -> Result<Vec<f64>> {
        if columns.len() != self.coefficients.len() {
            return Err(TrafficError::Computation(format!(
                "design has {} columns, model has {} coefficients",
                columns.len(),
                self.coefficients.len()
            )));
        }
        let n = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut predictions = vec![0.0; n];
        for (col, &beta) in columns.iter().zip(&self.coefficients) {
            for (pred, &x) in predictions.iter_mut().zip(col) {
                *pred += beta * x;
            }
        }
        Ok(predictions)
    }
}

/// Fit `y = X @ beta` minimising `|y - X beta|^2 + sum(penalty_j * beta_j^2)`.
///
/// Columns of `X` are given column-major. A zero penalty leaves the
/// coefficient unconstrained; the normal equations are solved by Cholesky.
pub fn ridge_fit(y: &[f64], columns: &[Vec<f64>], penalties: &[f64]) -> Result<RidgeResult> {
    let n = y.len();
    let k = columns.len();

    if n == 0 {
        return Err(TrafficError::InsufficientData { needed: 1, got: 0 });
    }
    if k == 0 {
        return Ok(RidgeResult {
            coefficients: vec![],
        });
    }
    if penalties.len() != k {
        return Err(TrafficError::Computation(format!(
            "{} penalties for {} columns",
            penalties.len(),
            k
        )));
    }
    if let Some(col) = columns.iter().find(|c| c.len() != n) {
        return Err(TrafficError::Computation(format!(
            "design column has {} rows, target has {}",
            col.len(),
            n
        )));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for i in 0..k {
        let ci = &columns[i];
        xty[i] = ci.iter().zip(y).map(|(a, b)| a * b).sum();
        for j in 0..=i {
            let v: f64 = ci.iter().zip(&columns[j]).map(|(a, b)| a * b).sum();
            xtx[i][j] = v;
            xtx[j][i] = v;
        }
    }

    // Penalty on the diagonal, plus a small ridge for numerical stability
    for i in 0..k {
        xtx[i][i] += penalties[i] + 1e-8;
    }

    let coefficients = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        TrafficError::Computation("least squares failed: matrix not positive definite".into())
    })?;

    Ok(RidgeResult { coefficients })
}

/// Solve symmetric positive definite system using Cholesky decomposition.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L @ L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum = a[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L @ y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum = b[i] - (0..i).map(|j| l[i][j] * y[j]).sum::<f64>();
        y[i] = sum / l[i][i];
    }

    // L' @ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum = y[i] - ((i + 1)..n).map(|j| l[j][i] * x[j]).sum::<f64>();
        x[i] = sum / l[i][i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ridge_fit_unpenalized_recovers_line() {
        // y = 2 + 3*x
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 3.0 * v).collect();
        let columns = vec![vec![1.0; 5], x];

        let result = ridge_fit(&y, &columns, &[0.0, 0.0]).unwrap();
        assert_relative_eq!(result.coefficients[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.coefficients[1], 3.0, epsilon = 1e-6);

        let fitted = result.predict(&columns).unwrap();
        for (f, t) in fitted.iter().zip(&y) {
            assert_relative_eq!(*f, *t, epsilon = 1e-6);
        }
    }

    #[test]
    fn penalty_shrinks_coefficient() {
        let x = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let y: Vec<f64> = x.iter().map(|v| 4.0 * v).collect();
        let columns = vec![x];

        let free = ridge_fit(&y, &columns, &[0.0]).unwrap();
        let shrunk = ridge_fit(&y, &columns, &[10.0]).unwrap();

        assert_relative_eq!(free.coefficients[0], 4.0, epsilon = 1e-6);
        // x'x = 10, so beta = 40 / (10 + 10) = 2
        assert_relative_eq!(shrunk.coefficients[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn collinear_columns_are_resolved_by_penalty() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let columns = vec![x.clone(), x.clone()];
        let y = x.clone();
        let result = ridge_fit(&y, &columns, &[1.0, 1.0]).unwrap();
        // Symmetric problem splits the weight evenly
        assert_relative_eq!(
            result.coefficients[0],
            result.coefficients[1],
            epsilon = 1e-9
        );
    }

    #[test]
    fn dimension_checks() {
        let y = vec![1.0, 2.0];
        assert!(ridge_fit(&y, &[vec![1.0]], &[0.0]).is_err());
        assert!(ridge_fit(&y, &[vec![1.0, 1.0]], &[]).is_err());
        assert!(matches!(
            ridge_fit(&[], &[], &[]),
            Err(TrafficError::InsufficientData { .. })
        ));
        assert!(ridge_fit(&y, &[], &[]).unwrap().coefficients.is_empty());
    }

    #[test]
    fn solve_symmetric_rejects_indefinite() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(solve_symmetric(&a, &[1.0, 1.0]).is_none());
    }
}

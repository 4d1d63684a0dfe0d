//! Accuracy metrics for forecast evaluation.

use crate::error::{Result, TrafficError};

/// Accuracy metrics for evaluating forecast performance.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over non-zero actuals (None if every actual is zero)
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// R-squared (coefficient of determination)
    pub r_squared: f64,
    /// Share of actuals inside the prediction interval, when bounds were given
    pub coverage: Option<f64>,
}

/// Calculate accuracy metrics between actual and predicted values.
pub fn calculate_metrics(actual: &[f64], predicted: &[f64]) -> Result<AccuracyMetrics> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(TrafficError::InsufficientData { needed: 1, got: 0 });
    }
    check_len(actual.len(), predicted.len())?;

    let n = actual.len() as f64;
    let mae = mae(actual, predicted);
    let mse = mse(actual, predicted);

    let nonzero: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| (*a, *p))
        .collect();
    let mape = if nonzero.is_empty() {
        None
    } else {
        let sum: f64 = nonzero.iter().map(|(a, p)| ((a - p) / a).abs()).sum();
        Some(100.0 * sum / nonzero.len() as f64)
    };

    let mean_actual = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        1.0 - mse * n / ss_tot
    };

    Ok(AccuracyMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
        smape: smape(actual, predicted),
        r_squared,
        coverage: None,
    })
}

/// Metrics including the empirical coverage of `[lower, upper]`.
pub fn calculate_interval_metrics(
    actual: &[f64],
    predicted: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> Result<AccuracyMetrics> {
    let mut metrics = calculate_metrics(actual, predicted)?;
    metrics.coverage = Some(coverage(actual, lower, upper)?);
    Ok(metrics)
}

/// Fraction of actual values falling within the bounds (inclusive).
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    check_len(actual.len(), lower.len())?;
    check_len(actual.len(), upper.len())?;
    if actual.is_empty() {
        return Err(TrafficError::InsufficientData { needed: 1, got: 0 });
    }
    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(a, (l, u))| *a >= *l && *a <= *u)
        .count();
    Ok(inside as f64 / actual.len() as f64)
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(TrafficError::Validation(format!(
            "length mismatch: expected {}, got {}",
            expected, got
        )));
    }
    Ok(())
}

/// Calculate MAE between two slices.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate MSE between two slices.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate RMSE between two slices.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Calculate SMAPE between two slices.
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn calculate_metrics_perfect_prediction() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let metrics = calculate_metrics(&actual, &actual).unwrap();

        assert_relative_eq!(metrics.mae, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.smape, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.r_squared, 1.0, epsilon = 1e-10);
        assert_eq!(metrics.mape, Some(0.0));
        assert_eq!(metrics.coverage, None);
    }

    #[test]
    fn calculate_metrics_known_values() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let predicted = vec![1.5, 2.5, 2.5, 4.5, 4.5];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();

        assert_relative_eq!(metrics.mae, 0.5, epsilon = 1e-10);
        assert_relative_eq!(metrics.mse, 0.25, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.5, epsilon = 1e-10);
        // ss_tot = 10, ss_res = 1.25
        assert_relative_eq!(metrics.r_squared, 0.875, epsilon = 1e-10);
    }

    #[test]
    fn mape_skips_zero_actuals() {
        let actual = vec![0.0, 10.0, 20.0];
        let predicted = vec![1.0, 11.0, 18.0];
        let metrics = calculate_metrics(&actual, &predicted).unwrap();
        // (10% + 10%) / 2
        assert_relative_eq!(metrics.mape.unwrap(), 10.0, epsilon = 1e-10);

        let zeros = calculate_metrics(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(zeros.mape, None);
    }

    #[test]
    fn coverage_counts_inclusive_bounds() {
        let actual = [1.0, 2.0, 3.0, 10.0];
        let lower = [0.0, 2.0, 3.5, 0.0];
        let upper = [2.0, 2.0, 4.0, 5.0];
        assert_relative_eq!(coverage(&actual, &lower, &upper).unwrap(), 0.5);

        let metrics = calculate_interval_metrics(&actual, &actual, &lower, &upper).unwrap();
        assert_eq!(metrics.coverage, Some(0.5));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(calculate_metrics(&[1.0, 2.0], &[1.0]).is_err());
        assert!(coverage(&[1.0], &[0.0, 0.0], &[2.0]).is_err());
        assert!(calculate_metrics(&[], &[]).is_err());
    }
}

//! Rolling-origin cross-validation over calendar dates.

use crate::core::TimeSeries;
use crate::error::{Result, TrafficError};
use crate::models::Forecaster;
use crate::utils::metrics::{calculate_interval_metrics, calculate_metrics, AccuracyMetrics};
use crate::utils::stats::std_dev;
use chrono::{Duration, NaiveDate};

/// Cross-validation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CVStrategy {
    /// Rolling window: the training window keeps `initial_days` and slides.
    Rolling,
    /// Expanding window: training always starts at the first observation.
    #[default]
    Expanding,
}

/// Configuration for time series cross-validation, in days.
#[derive(Debug, Clone, PartialEq)]
pub struct CVConfig {
    /// Minimum days of history before the first cutoff.
    pub initial_days: usize,
    /// Spacing between successive cutoffs.
    pub period_days: usize,
    /// Days forecast after each cutoff.
    pub horizon_days: usize,
    pub strategy: CVStrategy,
    /// Lower bound applied to every fold forecast before scoring.
    pub floor: Option<f64>,
}

impl CVConfig {
    /// Expanding-window configuration; cutoffs are spaced one horizon apart.
    pub fn expanding(initial_days: usize, horizon_days: usize) -> Self {
        Self {
            initial_days,
            period_days: horizon_days,
            horizon_days,
            strategy: CVStrategy::Expanding,
            floor: None,
        }
    }

    /// Rolling-window configuration with a fixed training span.
    pub fn rolling(window_days: usize, horizon_days: usize) -> Self {
        Self {
            strategy: CVStrategy::Rolling,
            ..Self::expanding(window_days, horizon_days)
        }
    }

    /// Set the spacing between cutoffs.
    pub fn with_period(mut self, period_days: usize) -> Self {
        self.period_days = period_days;
        self
    }

    /// Clamp fold forecasts to `floor`, as the adapter does for its own predictions.
    pub fn with_floor(mut self, floor: Option<f64>) -> Self {
        self.floor = floor;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("initial", self.initial_days),
            ("period", self.period_days),
            ("horizon", self.horizon_days),
        ] {
            if value == 0 {
                return Err(TrafficError::Validation(format!(
                    "cross-validation {} must be at least one day",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// One evaluated cutoff.
#[derive(Debug, Clone)]
pub struct CVFold {
    /// Last date included in training.
    pub cutoff: NaiveDate,
    /// Number of training observations.
    pub train_size: usize,
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub metrics: AccuracyMetrics,
}

/// Results from cross-validation.
#[derive(Debug, Clone)]
pub struct CVResults {
    /// Number of folds evaluated.
    pub n_folds: usize,
    /// Aggregated metrics across all folds.
    pub aggregated: AggregatedMetrics,
    /// Folds in ascending cutoff order.
    pub folds: Vec<CVFold>,
}

impl CVResults {
    pub fn cutoffs(&self) -> Vec<NaiveDate> {
        self.folds.iter().map(|f| f.cutoff).collect()
    }
}

/// Aggregated metrics from cross-validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedMetrics {
    /// Mean MAE across folds.
    pub mae: f64,
    /// Mean RMSE across folds.
    pub rmse: f64,
    /// Mean SMAPE across folds.
    pub smape: f64,
    /// Mean MAPE over folds that have one.
    pub mape: Option<f64>,
    /// Mean interval coverage across folds.
    pub coverage: Option<f64>,
    /// Standard deviation of MAE across folds.
    pub mae_std: f64,
    /// Standard deviation of RMSE across folds.
    pub rmse_std: f64,
}

/// Cutoff dates, ascending.
///
/// The latest cutoff leaves exactly one horizon after it; earlier ones step
/// back by `period_days` while at least `initial_days` lie on or before them.
pub fn cutoffs(config: &CVConfig, first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let earliest = first + Duration::days(config.initial_days as i64 - 1);
    let step = Duration::days(config.period_days.max(1) as i64);
    let mut cutoff = last - Duration::days(config.horizon_days as i64);
    let mut result = Vec::new();
    while cutoff >= earliest {
        result.push(cutoff);
        cutoff -= step;
    }
    result.reverse();
    result
}

/// Perform time series cross-validation.
///
/// # Arguments
/// * `config` - Cross-validation configuration
/// * `series` - The gap-free daily series to validate on
/// * `model_factory` - Function that creates a fresh model instance for each fold
///
/// # Example
/// ```
/// use traffic_forecast::config::Config;
/// use traffic_forecast::core::TimeSeries;
/// use traffic_forecast::models::AdditiveModel;
/// use traffic_forecast::utils::cross_validation::{cross_validate, CVConfig};
/// use chrono::{Duration, NaiveDate};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let dates: Vec<_> = (0..60).map(|i| start + Duration::days(i)).collect();
/// let ts = TimeSeries::new(dates, vec![50.0; 60]).unwrap();
///
/// let config = CVConfig::expanding(30, 7);
/// let model_config = Config::default().with_uncertainty_samples(100);
/// let results = cross_validate(&config, &ts, || AdditiveModel::new(model_config.clone())).unwrap();
///
/// assert_eq!(results.n_folds, 4);
/// assert!(results.aggregated.mae < 1.0);
/// ```
pub fn cross_validate<F, Factory>(
    config: &CVConfig,
    series: &TimeSeries,
    model_factory: Factory,
) -> Result<CVResults>
where
    F: Forecaster,
    Factory: Fn() -> F,
{
    config.validate()?;
    let needed = config.initial_days + config.horizon_days;
    let (first, last) = match (series.first_date(), series.last_date()) {
        (Some(f), Some(l)) if series.len() >= needed => (f, l),
        _ => {
            return Err(TrafficError::InsufficientData {
                needed,
                got: series.len(),
            })
        }
    };

    let mut folds = Vec::new();
    for cutoff in cutoffs(config, first, last) {
        let train_start = match config.strategy {
            CVStrategy::Rolling => cutoff - Duration::days(config.initial_days as i64 - 1),
            CVStrategy::Expanding => first,
        };
        let train = series.between(train_start, cutoff);
        let test = series.between(
            cutoff + Duration::days(1),
            cutoff + Duration::days(config.horizon_days as i64),
        );
        if train.len() < 2 || test.is_empty() {
            tracing::debug!(%cutoff, train = train.len(), test = test.len(), "skipping sparse fold");
            continue;
        }

        let mut model = model_factory();
        model.fit(&train)?;
        let mut forecast = model.predict_dates(test.dates())?;
        if let Some(floor) = config.floor {
            forecast.clamp_min(floor);
        }
        let predicted = forecast.point().to_vec();
        let actual = test.values().to_vec();

        let (lower, upper, metrics) = match (forecast.lower(), forecast.upper()) {
            (Some(l), Some(u)) => (
                l.to_vec(),
                u.to_vec(),
                calculate_interval_metrics(&actual, &predicted, l, u)?,
            ),
            _ => (
                predicted.clone(),
                predicted.clone(),
                calculate_metrics(&actual, &predicted)?,
            ),
        };
        tracing::debug!(%cutoff, mae = metrics.mae, "cross-validation fold");

        folds.push(CVFold {
            cutoff,
            train_size: train.len(),
            dates: test.dates().to_vec(),
            actual,
            predicted,
            lower,
            upper,
            metrics,
        });
    }

    if folds.is_empty() {
        return Err(TrafficError::InsufficientData {
            needed,
            got: (series.span_days() + 1) as usize,
        });
    }

    Ok(CVResults {
        n_folds: folds.len(),
        aggregated: aggregate(&folds),
        folds,
    })
}

fn aggregate(folds: &[CVFold]) -> AggregatedMetrics {
    let n = folds.len() as f64;
    let mae_values: Vec<f64> = folds.iter().map(|f| f.metrics.mae).collect();
    let rmse_values: Vec<f64> = folds.iter().map(|f| f.metrics.rmse).collect();
    let smape = folds.iter().map(|f| f.metrics.smape).sum::<f64>() / n;

    let mean_of = |values: Vec<f64>| {
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    };
    let mape = mean_of(folds.iter().filter_map(|f| f.metrics.mape).collect());
    let coverage = mean_of(folds.iter().filter_map(|f| f.metrics.coverage).collect());

    let spread = |values: &[f64]| {
        if values.len() < 2 {
            0.0
        } else {
            std_dev(values)
        }
    };

    AggregatedMetrics {
        mae: mae_values.iter().sum::<f64>() / n,
        rmse: rmse_values.iter().sum::<f64>() / n,
        smape,
        mape,
        coverage,
        mae_std: spread(&mae_values),
        rmse_std: spread(&rmse_values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Forecast;
    use approx::assert_relative_eq;

    /// Repeats the last training value with a fixed +-1 band.
    #[derive(Default)]
    struct LastValue {
        last: Option<(NaiveDate, f64)>,
        fitted: Option<Vec<f64>>,
    }

    impl Forecaster for LastValue {
        fn fit(&mut self, series: &TimeSeries) -> Result<()> {
            let value = *series.values().last().unwrap();
            self.last = Some((series.last_date().unwrap(), value));
            self.fitted = Some(series.values().to_vec());
            Ok(())
        }

        fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Forecast> {
            let (_, value) = self.last.ok_or(TrafficError::NotFitted)?;
            let n = dates.len();
            Ok(Forecast::from_values_with_intervals(
                vec![value; n],
                vec![value - 1.0; n],
                vec![value + 1.0; n],
            ))
        }

        fn last_date(&self) -> Option<NaiveDate> {
            self.last.map(|(d, _)| d)
        }

        fn fitted_values(&self) -> Option<&[f64]> {
            self.fitted.as_deref()
        }

        fn residuals(&self) -> Option<&[f64]> {
            None
        }

        fn name(&self) -> &str {
            "LastValue"
        }
    }

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(i)
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        let dates = (0..values.len() as i64).map(day).collect();
        TimeSeries::new(dates, values).unwrap()
    }

    #[test]
    fn cutoffs_step_back_from_the_end() {
        let config = CVConfig::expanding(365, 30);
        // 400 days: last = day 399, cutoff = day 369; day 339 precedes day 364
        let cuts = cutoffs(&config, day(0), day(399));
        assert_eq!(cuts, vec![day(369)]);

        let config = CVConfig::expanding(10, 5).with_period(3);
        let cuts = cutoffs(&config, day(0), day(29));
        // 24, 21, 18, 15, 12, 9 (day 9 is the tenth day)
        assert_eq!(cuts.first(), Some(&day(9)));
        assert_eq!(cuts.last(), Some(&day(24)));
        assert_eq!(cuts.len(), 6);
    }

    #[test]
    fn cv_expanding_window_basic() {
        let ts = series((0..40).map(|i| i as f64).collect());
        let config = CVConfig::expanding(20, 5);
        let results = cross_validate(&config, &ts, LastValue::default).unwrap();

        // cutoffs 19, 24, 29, 34
        assert_eq!(results.n_folds, 4);
        assert_eq!(results.cutoffs(), vec![day(19), day(24), day(29), day(34)]);
        assert_eq!(results.folds[0].train_size, 20);
        assert_eq!(results.folds[3].train_size, 35);
        // Linear growth of 1/day: errors 1..=5 in every fold
        assert_relative_eq!(results.aggregated.mae, 3.0, epsilon = 1e-12);
        assert_relative_eq!(results.aggregated.mae_std, 0.0, epsilon = 1e-12);
        // Only the first step of each fold lands inside the +-1 band
        assert_relative_eq!(results.aggregated.coverage.unwrap(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn cv_rolling_window_keeps_train_size() {
        let ts = series((0..40).map(|i| i as f64).collect());
        let config = CVConfig::rolling(20, 5);
        let results = cross_validate(&config, &ts, LastValue::default).unwrap();

        assert_eq!(results.n_folds, 4);
        assert!(results.folds.iter().all(|f| f.train_size == 20));
    }

    #[test]
    fn cv_requires_initial_plus_horizon() {
        let ts = series(vec![1.0; 300]);
        let config = CVConfig::expanding(365, 30);
        let err = cross_validate(&config, &ts, LastValue::default).unwrap_err();
        assert_eq!(err, TrafficError::InsufficientData { needed: 395, got: 300 });
    }

    #[test]
    fn cv_rejects_zero_period() {
        let ts = series(vec![1.0; 50]);
        let config = CVConfig::expanding(20, 5).with_period(0);
        assert!(matches!(
            cross_validate(&config, &ts, LastValue::default),
            Err(TrafficError::Validation(_))
        ));
    }
}

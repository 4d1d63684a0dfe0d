//! Forecaster trait defining the interface the adapter drives.

use crate::core::{Forecast, TimeSeries};
use crate::error::{Result, TrafficError};
use chrono::{Duration, NaiveDate};

/// Common interface for date-aware forecasting models.
///
/// This trait is object-safe and can be used with `Box<dyn Forecaster>`.
pub trait Forecaster {
    /// Fit the model to a daily series. The series must have no missing values.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Predict arbitrary dates, in or after the fitted range.
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Forecast>;

    /// Last date of the fitted history.
    fn last_date(&self) -> Option<NaiveDate>;

    /// Predict the `horizon` consecutive days following the fitted history.
    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let last = self.last_date().ok_or(TrafficError::NotFitted)?;
        self.predict_dates(&future_dates(last, horizon))
    }

    /// Get the fitted values (in-sample predictions).
    fn fitted_values(&self) -> Option<&[f64]>;

    /// Get the residuals (actual - fitted).
    fn residuals(&self) -> Option<&[f64]>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool {
        self.fitted_values().is_some()
    }
}

/// The `horizon` calendar days after `last`.
pub fn future_dates(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64)
        .map(|i| last + Duration::days(i))
        .collect()
}

//! Bridge between the history table and the forecasting model.
//!
//! [`UnfittedAdapter`] and [`FittedAdapter`] encode the fit-before-predict
//! rule in the type system. [`ForecastAdapter`] wraps both for callers
//! that keep one adapter in a single slot and need the runtime checks.

use crate::config::Config;
use crate::core::{ForecastTable, HistoryTable, TimeSeries};
use crate::error::{Result, TrafficError};
use crate::models::{future_dates, AdditiveModel, Forecaster};
use crate::utils::cross_validation::{cross_validate, CVConfig, CVResults};
use crate::utils::metrics::{calculate_interval_metrics, AccuracyMetrics};

/// Share of the history always kept for training by the holdout check.
const MIN_TRAIN_SHARE: f64 = 0.8;

/// Accuracy of a model trained without the most recent days, scored on them.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: AccuracyMetrics,
}

/// Adapter holding configuration only.
#[derive(Debug, Clone)]
pub struct UnfittedAdapter {
    config: Config,
}

impl UnfittedAdapter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Fit the model on the clicks of a preprocessed history.
    pub fn fit(self, history: &HistoryTable) -> Result<FittedAdapter> {
        self.config.validate()?;
        if history.has_missing() {
            return Err(TrafficError::Validation(
                "history has missing values; preprocess it before fitting".to_string(),
            ));
        }
        let series = history.clicks();
        if series.len() < 2 {
            return Err(TrafficError::InsufficientData {
                needed: 2,
                got: series.len(),
            });
        }

        let validation = self.holdout(&series)?;

        let mut model = AdditiveModel::new(self.config.clone());
        model.fit(&series)?;
        let mut fitted_forecast = model.predict_dates(series.dates())?;
        if let Some(floor) = self.config.floor {
            fitted_forecast.clamp_min(floor);
        }
        let fitted = ForecastTable::from_forecast(series.dates(), fitted_forecast)?;

        tracing::info!(
            observations = series.len(),
            components = ?model.component_names(),
            changepoints = model.changepoints().len(),
            "model fitted"
        );

        Ok(FittedAdapter {
            config: self.config,
            series,
            model,
            fitted,
            validation,
        })
    }

    fn holdout(&self, series: &TimeSeries) -> Result<Option<ValidationReport>> {
        let n = series.len();
        let days = self.config.validation_days;
        if days == 0 {
            return Ok(None);
        }
        let min_train = (n as f64 * MIN_TRAIN_SHARE).floor() as usize;
        let train_size = n.saturating_sub(days).max(min_train);
        if train_size >= n || train_size < 2 {
            return Ok(None);
        }

        let train = series.slice(0, train_size)?;
        let test = series.slice(train_size, n)?;
        let mut model = AdditiveModel::new(self.config.clone());
        model.fit(&train)?;
        let mut forecast = model.predict_dates(test.dates())?;
        if let Some(floor) = self.config.floor {
            forecast.clamp_min(floor);
        }
        let (lower, upper) = match (forecast.lower(), forecast.upper()) {
            (Some(l), Some(u)) => (l, u),
            _ => return Ok(None),
        };
        let metrics = calculate_interval_metrics(test.values(), forecast.point(), lower, upper)?;

        tracing::info!(
            train = train_size,
            test = test.len(),
            mae = metrics.mae,
            rmse = metrics.rmse,
            mape = ?metrics.mape,
            "holdout validation"
        );
        Ok(Some(ValidationReport {
            train_size,
            test_size: test.len(),
            metrics,
        }))
    }
}

/// Adapter holding a fitted model and the series it was fitted on.
#[derive(Debug, Clone)]
pub struct FittedAdapter {
    config: Config,
    series: TimeSeries,
    model: AdditiveModel,
    fitted: ForecastTable,
    validation: Option<ValidationReport>,
}

impl FittedAdapter {
    /// Forecast the `horizon_days` days after the last history date.
    ///
    /// Zero yields an empty table; a negative horizon is rejected.
    pub fn predict(&self, horizon_days: i64) -> Result<ForecastTable> {
        if horizon_days < 0 {
            return Err(TrafficError::Validation(format!(
                "horizon must not be negative, got {horizon_days}"
            )));
        }
        if horizon_days == 0 {
            return Ok(ForecastTable::default());
        }
        let last = self.model.last_date().ok_or(TrafficError::NotFitted)?;
        let dates = future_dates(last, horizon_days as usize);
        let mut forecast = self.model.predict_dates(&dates)?;
        if let Some(floor) = self.config.floor {
            forecast.clamp_min(floor);
        }
        ForecastTable::from_forecast(&dates, forecast)
    }

    /// In-sample predictions over the history dates.
    pub fn fitted(&self) -> &ForecastTable {
        &self.fitted
    }

    /// Holdout metrics, when `validation_days` allowed a holdout.
    pub fn validation(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    /// Simulated historical forecasts with an expanding window.
    pub fn cross_validate(
        &self,
        initial_days: i64,
        period_days: i64,
        horizon_days: i64,
    ) -> Result<CVResults> {
        let days = |name: &str, value: i64| {
            if value > 0 {
                Ok(value as usize)
            } else {
                Err(TrafficError::Validation(format!(
                    "cross-validation {name} must be positive, got {value}"
                )))
            }
        };
        let config = CVConfig::expanding(days("initial", initial_days)?, days("horizon", horizon_days)?)
            .with_period(days("period", period_days)?);
        self.cross_validate_with(&config)
    }

    /// Cross-validation with an explicit configuration (e.g. a rolling window).
    ///
    /// Fold forecasts are clamped to the configured floor unless `cv` sets
    /// its own.
    pub fn cross_validate_with(&self, cv: &CVConfig) -> Result<CVResults> {
        let cv = match cv.floor {
            Some(_) => cv.clone(),
            None => cv.clone().with_floor(self.config.floor),
        };
        let results = cross_validate(&cv, &self.series, || AdditiveModel::new(self.config.clone()))?;
        tracing::info!(
            folds = results.n_folds,
            mae = results.aggregated.mae,
            mape = ?results.aggregated.mape,
            coverage = ?results.aggregated.coverage,
            "cross-validation finished"
        );
        Ok(results)
    }

    pub fn model(&self) -> &AdditiveModel {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clicks series the model was fitted on.
    pub fn series(&self) -> &TimeSeries {
        &self.series
    }
}

/// Runtime-checked adapter: `fit` once, then `predict`.
#[derive(Debug, Clone)]
pub enum ForecastAdapter {
    Unfitted(UnfittedAdapter),
    Fitted(Box<FittedAdapter>),
}

impl ForecastAdapter {
    pub fn new(config: Config) -> Self {
        ForecastAdapter::Unfitted(UnfittedAdapter::new(config))
    }

    /// Fit on `history`. Fails with `AlreadyFitted` on a fitted adapter;
    /// call [`reset`](Self::reset) first to fit again.
    pub fn fit(&mut self, history: &HistoryTable) -> Result<()> {
        match self {
            ForecastAdapter::Fitted(_) => Err(TrafficError::AlreadyFitted),
            ForecastAdapter::Unfitted(unfitted) => {
                let fitted = unfitted.clone().fit(history)?;
                *self = ForecastAdapter::Fitted(Box::new(fitted));
                Ok(())
            }
        }
    }

    /// Drop the fitted model, keeping the configuration.
    pub fn reset(&mut self) {
        if let ForecastAdapter::Fitted(fitted) = self {
            *self = ForecastAdapter::new(fitted.config.clone());
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, ForecastAdapter::Fitted(_))
    }

    pub fn as_fitted(&self) -> Result<&FittedAdapter> {
        match self {
            ForecastAdapter::Fitted(fitted) => Ok(fitted.as_ref()),
            ForecastAdapter::Unfitted(_) => Err(TrafficError::NotFitted),
        }
    }

    pub fn predict(&self, horizon_days: i64) -> Result<ForecastTable> {
        self.as_fitted()?.predict(horizon_days)
    }

    pub fn fitted(&self) -> Result<&ForecastTable> {
        Ok(self.as_fitted()?.fitted())
    }

    pub fn cross_validate(
        &self,
        initial_days: i64,
        period_days: i64,
        horizon_days: i64,
    ) -> Result<CVResults> {
        self.as_fitted()?
            .cross_validate(initial_days, period_days, horizon_days)
    }
}

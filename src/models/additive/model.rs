//! Additive trend + seasonality + holidays model.
//!
//! ```text
//! y(t) = trend(t) * (1 + S_mult(t)) + S_add(t) + e(t)
//! ```
//!
//! The trend is piecewise linear (optionally through a logistic link) with
//! penalized changepoint deltas; seasonality is a set of Fourier blocks and
//! holiday indicators. Coefficients come from one penalized least-squares
//! solve per stage. Prediction intervals are simulated: future changepoints
//! arrive at the historical rate with Laplace-distributed deltas, and
//! Gaussian noise with the residual scale is added on top.

use super::seasonality::{active_blocks, SeasonalBlock};
use super::trend::{hinge_columns, place_changepoints, PiecewiseTrend, TrendLink};
use crate::config::{Config, Growth, SeasonalityMode};
use crate::core::{Forecast, TimeSeries};
use crate::error::{Result, TrafficError};
use crate::models::Forecaster;
use crate::utils::ols::ridge_fit;
use crate::utils::stats::quantile_sorted;
use chrono::{Duration, NaiveDate};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Laplace, Normal};

/// Decomposable forecasting model for daily traffic.
///
/// # Example
///
/// ```
/// use traffic_forecast::config::Config;
/// use traffic_forecast::core::TimeSeries;
/// use traffic_forecast::models::{AdditiveModel, Forecaster};
/// use chrono::{Duration, NaiveDate};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let dates: Vec<_> = (0..90).map(|i| start + Duration::days(i)).collect();
/// let values: Vec<f64> = (0..90).map(|i| 100.0 + i as f64).collect();
/// let ts = TimeSeries::new(dates, values).unwrap();
///
/// let mut model = AdditiveModel::new(Config::default().with_uncertainty_samples(200));
/// model.fit(&ts).unwrap();
/// let forecast = model.predict(7).unwrap();
/// assert_eq!(forecast.horizon(), 7);
/// assert!(forecast.point()[6] > 180.0);
/// ```
#[derive(Debug, Clone)]
pub struct AdditiveModel {
    config: Config,
    state: Option<FittedState>,
}

#[derive(Debug, Clone)]
struct FittedBlock {
    block: SeasonalBlock,
    coefficients: Vec<f64>,
}

#[derive(Debug, Clone)]
struct FittedState {
    start: NaiveDate,
    last: NaiveDate,
    span_days: f64,
    y_scale: f64,
    link: TrendLink,
    trend: PiecewiseTrend,
    blocks: Vec<FittedBlock>,
    multiplicative: bool,
    /// Residual standard deviation in scaled units.
    sigma: f64,
    /// Probability of a new changepoint per future day.
    changepoint_rate: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedState {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    /// Per-block seasonal contributions (scaled, before trend weighting).
    fn seasonal_terms(&self, dates: &[NaiveDate]) -> Vec<Vec<f64>> {
        self.blocks
            .iter()
            .map(|fb| {
                let columns = fb.block.columns(dates);
                let mut values = vec![0.0; dates.len()];
                for (col, beta) in columns.iter().zip(&fb.coefficients) {
                    for (v, x) in values.iter_mut().zip(col) {
                        *v += beta * x;
                    }
                }
                values
            })
            .collect()
    }

    fn compose(&self, trend: f64, seasonal: f64) -> f64 {
        if self.multiplicative {
            trend * (1.0 + seasonal)
        } else {
            trend + seasonal
        }
    }
}

impl AdditiveModel {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changepoint dates of the fitted trend.
    pub fn changepoints(&self) -> Vec<NaiveDate> {
        match &self.state {
            Some(state) => state
                .trend
                .changepoints
                .iter()
                .map(|s| state.start + Duration::days((s * state.span_days).round() as i64))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Names of the components the fitted model reports, trend first.
    pub fn component_names(&self) -> Vec<String> {
        let mut names = vec!["trend".to_string()];
        if let Some(state) = &self.state {
            for fb in &state.blocks {
                let name = fb.block.component().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Residual standard deviation in data units.
    pub fn sigma(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.sigma * s.y_scale)
    }

    fn state(&self) -> Result<&FittedState> {
        self.state.as_ref().ok_or(TrafficError::NotFitted)
    }

    fn fit_state(&self, series: &TimeSeries) -> Result<FittedState> {
        let n = series.len();
        if n < 2 {
            return Err(TrafficError::InsufficientData { needed: 2, got: n });
        }
        if series.has_missing_values() {
            return Err(TrafficError::Validation(
                "model input contains missing values".to_string(),
            ));
        }

        let dates = series.dates();
        let y = series.values();
        let start = dates[0];
        let last = dates[n - 1];
        let span_days = series.span_days() as f64;

        let y_max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let y_scale = match y.iter().map(|v| v.abs()).fold(0.0, f64::max) {
            s if s > 1e-12 => s,
            _ => 1.0,
        };
        let ys: Vec<f64> = y.iter().map(|v| v / y_scale).collect();
        let t: Vec<f64> = dates
            .iter()
            .map(|d| (*d - start).num_days() as f64 / span_days)
            .collect();

        let link = match self.config.growth {
            Growth::Linear => TrendLink::Identity,
            Growth::Logistic => {
                let floor = self.config.floor.unwrap_or(0.0);
                let cap = self.config.cap.unwrap_or(1.5 * y_max);
                if cap <= floor {
                    return Err(TrafficError::Validation(format!(
                        "logistic growth needs cap ({cap}) above floor ({floor})"
                    )));
                }
                TrendLink::Logistic {
                    floor: floor / y_scale,
                    cap: cap / y_scale,
                }
            }
        };

        let changepoints = place_changepoints(
            &t,
            self.config.n_changepoints,
            self.config.changepoint_range,
        );
        let n_cp = changepoints.len();
        let trend_columns = hinge_columns(&t, &changepoints);
        let cp_penalty = 1.0 / self.config.changepoint_prior_scale.powi(2);

        let blocks = active_blocks(&self.config, dates, span_days);
        let block_columns: Vec<Vec<Vec<f64>>> = blocks.iter().map(|b| b.columns(dates)).collect();

        // Stage 1: trend and seasonal terms jointly on the link scale
        let target: Vec<f64> = ys.iter().map(|v| link.invert(*v)).collect();
        let mut columns = trend_columns;
        let mut penalties = vec![0.0, 0.0];
        penalties.extend(std::iter::repeat(cp_penalty).take(n_cp));
        for (block, cols) in blocks.iter().zip(&block_columns) {
            penalties.extend(std::iter::repeat(block.penalty()).take(cols.len()));
            columns.extend(cols.iter().cloned());
        }
        let joint = ridge_fit(&target, &columns, &penalties)?;
        let trend = PiecewiseTrend::from_coefficients(changepoints, &joint.coefficients);
        let trend_level: Vec<f64> = t.iter().map(|&ti| link.apply(trend.evaluate(ti))).collect();

        let multiplicative = self.config.seasonality_mode == SeasonalityMode::Multiplicative;
        let one_stage = link == TrendLink::Identity && !multiplicative;

        let block_coefficients: Vec<Vec<f64>> = if one_stage || blocks.is_empty() {
            let mut offset = 2 + n_cp;
            blocks
                .iter()
                .map(|b| {
                    let width = b.width();
                    let coefs = joint.coefficients[offset..offset + width].to_vec();
                    offset += width;
                    coefs
                })
                .collect()
        } else {
            // Stage 2: seasonal terms on the data scale against the fixed trend
            let remainder: Vec<f64> = ys.iter().zip(&trend_level).map(|(v, tr)| v - tr).collect();
            let mut columns = Vec::new();
            let mut penalties = Vec::new();
            for (block, cols) in blocks.iter().zip(&block_columns) {
                for col in cols {
                    let weighted = if multiplicative {
                        col.iter().zip(&trend_level).map(|(x, tr)| x * tr).collect()
                    } else {
                        col.clone()
                    };
                    columns.push(weighted);
                    penalties.push(block.penalty());
                }
            }
            let seasonal = ridge_fit(&remainder, &columns, &penalties)?;
            let mut offset = 0;
            blocks
                .iter()
                .map(|b| {
                    let width = b.width();
                    let coefs = seasonal.coefficients[offset..offset + width].to_vec();
                    offset += width;
                    coefs
                })
                .collect()
        };

        let mut state = FittedState {
            start,
            last,
            span_days,
            y_scale,
            link,
            changepoint_rate: (n_cp as f64 / n as f64).min(1.0),
            trend,
            blocks: blocks
                .into_iter()
                .zip(block_coefficients)
                .map(|(block, coefficients)| FittedBlock {
                    block,
                    coefficients,
                })
                .collect(),
            multiplicative,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
        };

        let seasonal = state.seasonal_terms(dates);
        let fitted: Vec<f64> = (0..n)
            .map(|i| {
                let s: f64 = seasonal.iter().map(|b| b[i]).sum();
                state.compose(trend_level[i], s) * y_scale
            })
            .collect();
        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();
        let rss: f64 = residuals.iter().map(|r| (r / y_scale).powi(2)).sum();
        state.sigma = (rss / n as f64).sqrt();
        state.fitted = fitted;
        state.residuals = residuals;

        tracing::debug!(
            observations = n,
            changepoints = n_cp,
            blocks = state.blocks.len(),
            sigma = state.sigma * y_scale,
            "additive model fitted"
        );
        Ok(state)
    }

    /// Simulated interval bounds for each date, in scaled units.
    fn simulate_bounds(
        &self,
        state: &FittedState,
        t: &[f64],
        seasonal: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let samples = self.config.uncertainty_samples;
        let width = self.config.interval_width;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let noise = Normal::new(0.0, 1.0).map_err(|e| TrafficError::Computation(e.to_string()))?;
        let laplace = Laplace::new(0.0, state.trend.mean_abs_delta() + 1e-8)
            .map_err(|e| TrafficError::Computation(e.to_string()))?;
        let rate = if state.trend.changepoints.is_empty() {
            0.0
        } else {
            state.changepoint_rate
        };

        let mut draws = vec![Vec::with_capacity(samples); t.len()];
        for _ in 0..samples {
            // Extra trend from simulated changepoints: extra_slope * t + extra_offset
            let mut extra_slope = 0.0;
            let mut extra_offset = 0.0;
            for (i, &ti) in t.iter().enumerate() {
                if ti > 1.0 && rate > 0.0 && rng.gen_bool(rate) {
                    let delta = laplace.sample(&mut rng);
                    extra_slope += delta;
                    extra_offset -= delta * ti;
                }
                let g = state.trend.evaluate(ti) + extra_slope * ti + extra_offset;
                let level = state.link.apply(g);
                let value = state.compose(level, seasonal[i]) + state.sigma * noise.sample(&mut rng);
                draws[i].push(value);
            }
        }

        let lo_q = (1.0 - width) / 2.0;
        let hi_q = (1.0 + width) / 2.0;
        let mut lower = Vec::with_capacity(t.len());
        let mut upper = Vec::with_capacity(t.len());
        for mut values in draws {
            values.sort_by(|a, b| a.total_cmp(b));
            lower.push(quantile_sorted(&values, lo_q));
            upper.push(quantile_sorted(&values, hi_q));
        }
        Ok((lower, upper))
    }
}

impl Forecaster for AdditiveModel {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.state = Some(self.fit_state(series)?);
        Ok(())
    }

    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Forecast> {
        let state = self.state()?;
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(TrafficError::Validation(format!(
                "prediction dates must be strictly increasing ({} follows {})",
                w[1], w[0]
            )));
        }
        if dates.is_empty() {
            return Ok(Forecast::from_values_with_intervals(vec![], vec![], vec![]));
        }

        let t: Vec<f64> = dates.iter().map(|d| state.scaled_time(*d)).collect();
        let trend: Vec<f64> = t
            .iter()
            .map(|&ti| state.link.apply(state.trend.evaluate(ti)))
            .collect();
        let per_block = state.seasonal_terms(dates);
        let seasonal: Vec<f64> = (0..dates.len())
            .map(|i| per_block.iter().map(|b| b[i]).sum())
            .collect();

        let scale = state.y_scale;
        let point: Vec<f64> = trend
            .iter()
            .zip(&seasonal)
            .map(|(tr, s)| state.compose(*tr, *s) * scale)
            .collect();
        let (lower, upper) = self.simulate_bounds(state, &t, &seasonal)?;
        let lower = lower.into_iter().map(|v| v * scale).collect();
        let upper = upper.into_iter().map(|v| v * scale).collect();

        let mut forecast = Forecast::from_values_with_intervals(point, lower, upper)
            .with_component("trend", trend.iter().map(|v| v * scale).collect());

        // Each component in data units: its share of the prediction
        let mut merged: Vec<(String, Vec<f64>)> = Vec::new();
        for (fb, values) in state.blocks.iter().zip(per_block) {
            let contribution: Vec<f64> = values
                .iter()
                .zip(&trend)
                .map(|(s, tr)| {
                    if state.multiplicative {
                        s * tr * scale
                    } else {
                        s * scale
                    }
                })
                .collect();
            let name = fb.block.component();
            match merged.iter_mut().find(|(n, _)| n == name) {
                Some((_, acc)) => acc.iter_mut().zip(&contribution).for_each(|(a, c)| *a += c),
                None => merged.push((name.to_string(), contribution)),
            }
        }
        for (name, values) in merged {
            forecast = forecast.with_component(name, values);
        }
        Ok(forecast)
    }

    fn last_date(&self) -> Option<NaiveDate> {
        self.state.as_ref().map(|s| s.last)
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.residuals.as_slice())
    }

    fn name(&self) -> &str {
        "Additive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HolidaySpec;
    use approx::assert_relative_eq;
    use chrono::Datelike;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(i)
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        let dates = (0..values.len() as i64).map(day).collect();
        TimeSeries::new(dates, values).unwrap()
    }

    fn quick_config() -> Config {
        Config::default().with_uncertainty_samples(200)
    }

    #[test]
    fn constant_series_forecasts_constant() {
        let mut model = AdditiveModel::new(Config::default());
        model.fit(&series(vec![100.0; 400])).unwrap();

        let forecast = model.predict(30).unwrap();
        assert_eq!(forecast.horizon(), 30);
        for (i, &p) in forecast.point().iter().enumerate() {
            assert!((95.0..=105.0).contains(&p), "step {i}: {p}");
            assert!(forecast.lower().unwrap()[i] <= p + 1e-6);
            assert!(forecast.upper().unwrap()[i] >= p - 1e-6);
        }
    }

    #[test]
    fn linear_trend_is_extrapolated() {
        let values: Vec<f64> = (0..120).map(|i| 50.0 + 2.0 * i as f64).collect();
        let config = quick_config()
            .with_seasonality_mode(SeasonalityMode::Additive)
            .with_seasonalities(false, false, false);
        let mut model = AdditiveModel::new(config);
        model.fit(&series(values)).unwrap();

        let forecast = model.predict(10).unwrap();
        // Day 129 continues the line: 50 + 2 * 129 = 308
        assert_relative_eq!(forecast.point()[9], 308.0, max_relative = 0.02);
        let fitted = model.fitted_values().unwrap();
        assert_relative_eq!(fitted[60], 170.0, max_relative = 0.01);
    }

    #[test]
    fn weekly_pattern_is_recovered() {
        // Weekends (day 5, 6 of each week starting Monday) get half the traffic
        let values: Vec<f64> = (0..140)
            .map(|i| if i % 7 >= 5 { 100.0 } else { 200.0 })
            .collect();
        let mut model = AdditiveModel::new(quick_config());
        model.fit(&series(values)).unwrap();

        let forecast = model.predict(14).unwrap();
        let dates: Vec<NaiveDate> = (140..154).map(day).collect();
        for (date, &p) in dates.iter().zip(forecast.point()) {
            let expected = if date.weekday().num_days_from_monday() >= 5 {
                100.0
            } else {
                200.0
            };
            assert_relative_eq!(p, expected, max_relative = 0.1);
        }
        assert!(forecast.component("weekly").is_some());
        assert!(forecast.component("yearly").is_none());
    }

    #[test]
    fn components_sum_to_prediction() {
        let values: Vec<f64> = (0..100)
            .map(|i| 80.0 + i as f64 * 0.5 + if i % 7 == 0 { 20.0 } else { 0.0 })
            .collect();
        for mode in [SeasonalityMode::Additive, SeasonalityMode::Multiplicative] {
            let mut model = AdditiveModel::new(quick_config().with_seasonality_mode(mode));
            model.fit(&series(values.clone())).unwrap();
            let forecast = model.predict(5).unwrap();
            for i in 0..5 {
                let total: f64 = forecast.components().iter().map(|c| c.values[i]).sum();
                assert_relative_eq!(total, forecast.point()[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn holiday_effect_is_learned() {
        let holidays: Vec<NaiveDate> = (0..8).map(|k| day(10 + k * 14)).collect();
        let values: Vec<f64> = (0..120)
            .map(|i| if (i - 10) % 14 == 0 && i >= 10 { 300.0 } else { 100.0 })
            .collect();
        let config = quick_config()
            .with_seasonality_mode(SeasonalityMode::Additive)
            .with_seasonalities(false, false, false)
            .with_holiday(HolidaySpec::new("promo", {
                let mut all = holidays.clone();
                all.push(day(122));
                all
            }));
        let mut model = AdditiveModel::new(config);
        model.fit(&series(values)).unwrap();

        assert_eq!(model.component_names(), vec!["trend", "holidays"]);
        let forecast = model.predict_dates(&[day(121), day(122)]).unwrap();
        assert!(forecast.point()[1] > forecast.point()[0] + 150.0);
    }

    #[test]
    fn logistic_growth_stays_below_cap() {
        let values: Vec<f64> = (0..200)
            .map(|i| 1000.0 / (1.0 + (-(i as f64 - 100.0) / 20.0).exp()))
            .collect();
        let config = quick_config()
            .with_growth(Growth::Logistic)
            .with_cap(1100.0)
            .with_seasonalities(false, false, false);
        let mut model = AdditiveModel::new(config);
        model.fit(&series(values)).unwrap();

        let forecast = model.predict(365).unwrap();
        assert!(forecast.point().iter().all(|&p| p <= 1100.0 + 1e-6));
        assert!(forecast.point()[364] > 900.0);
    }

    #[test]
    fn intervals_widen_with_noise_and_are_reproducible() {
        let values: Vec<f64> = (0..150)
            .map(|i| 100.0 + if i % 2 == 0 { 10.0 } else { -10.0 })
            .collect();
        let mut model = AdditiveModel::new(quick_config());
        model.fit(&series(values)).unwrap();

        let first = model.predict(10).unwrap();
        let second = model.predict(10).unwrap();
        assert_eq!(first, second);

        let lower = first.lower().unwrap();
        let upper = first.upper().unwrap();
        for i in 0..10 {
            assert!(upper[i] - lower[i] > 20.0);
            assert!(lower[i] < first.point()[i] && first.point()[i] < upper[i]);
        }
        assert!(model.sigma().unwrap() > 5.0);
    }

    #[test]
    fn fit_requires_two_clean_points() {
        let mut model = AdditiveModel::new(quick_config());
        assert_eq!(
            model.fit(&series(vec![1.0])),
            Err(TrafficError::InsufficientData { needed: 2, got: 1 })
        );
        assert!(matches!(
            model.fit(&series(vec![1.0, f64::NAN, 3.0])),
            Err(TrafficError::Validation(_))
        ));
        assert!(!model.is_fitted());
        assert_eq!(model.predict(3), Err(TrafficError::NotFitted));
    }

    #[test]
    fn predict_dates_rejects_unordered_dates() {
        let mut model = AdditiveModel::new(quick_config());
        model.fit(&series(vec![10.0; 30])).unwrap();
        assert!(model.predict_dates(&[day(40), day(35)]).is_err());
        assert_eq!(model.predict_dates(&[]).unwrap().horizon(), 0);
        assert_eq!(model.last_date(), Some(day(29)));
        assert!(!model.changepoints().is_empty());
    }
}

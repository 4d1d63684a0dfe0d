//! Run configuration.
//!
//! A [`Config`] is built once per run, validated, and passed explicitly to
//! every stage. It can be constructed in code with the `with_*` methods,
//! deserialized from a TOML file, or both.

use crate::error::{Result, TrafficError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Trend growth mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Growth {
    /// Piecewise linear trend.
    #[default]
    Linear,
    /// Piecewise logistic trend saturating at a capacity.
    Logistic,
}

/// How seasonal effects combine with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    /// Seasonality is added to the trend.
    Additive,
    /// Seasonality scales the trend.
    #[default]
    Multiplicative,
}

/// Strategy for filling missing metric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Carry the last observation forward (leading gaps take the first one).
    #[default]
    ForwardFill,
    /// Linear interpolation between neighbours, edges held constant.
    Interpolate,
}

/// What the loader does with a date that appears more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with a validation error naming the date.
    #[default]
    Reject,
    /// Keep the first row for the date and drop the rest.
    KeepFirst,
}

macro_rules! impl_keyword_enum {
    ($ty:ident { $($variant:ident => $kw:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => f.write_str($kw),)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = TrafficError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($kw => Ok($ty::$variant),)+
                    other => Err(TrafficError::Config(format!(
                        "unknown {} '{}', expected one of: {}",
                        stringify!($ty),
                        other,
                        [$($kw),+].join(", ")
                    ))),
                }
            }
        }
    };
}

impl_keyword_enum!(Growth { Linear => "linear", Logistic => "logistic" });
impl_keyword_enum!(SeasonalityMode {
    Additive => "additive",
    Multiplicative => "multiplicative",
});
impl_keyword_enum!(FillPolicy {
    ForwardFill => "forward_fill",
    Interpolate => "interpolate",
});
impl_keyword_enum!(DuplicatePolicy {
    Reject => "reject",
    KeepFirst => "keep_first",
});

/// A named group of holiday dates with an effect window around each date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HolidaySpec {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    /// Days before each date that share the effect (zero or negative).
    #[serde(default)]
    pub lower_window: i64,
    /// Days after each date that share the effect (zero or positive).
    #[serde(default)]
    pub upper_window: i64,
}

impl HolidaySpec {
    pub fn new(name: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        Self {
            name: name.into(),
            dates,
            lower_window: 0,
            upper_window: 0,
        }
    }

    pub fn with_windows(mut self, lower: i64, upper: i64) -> Self {
        self.lower_window = lower;
        self.upper_window = upper;
        self
    }

    /// Check whether `date` falls inside the window of any listed date.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.dates.iter().any(|&d| {
            let offset = (date - d).num_days();
            offset >= self.lower_window && offset <= self.upper_window
        })
    }
}

/// Model and pipeline options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Trend growth mode.
    pub growth: Growth,
    /// Flexibility of the trend; larger values allow sharper slope changes.
    pub changepoint_prior_scale: f64,
    /// Fraction of the history in which changepoints may be placed.
    pub changepoint_range: f64,
    /// Number of potential changepoints.
    pub n_changepoints: usize,
    pub seasonality_mode: SeasonalityMode,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub monthly_seasonality: bool,
    pub monthly_period: f64,
    pub monthly_fourier_order: usize,
    /// Regularization scale for seasonal coefficients.
    pub seasonality_prior_scale: f64,
    /// Regularization scale for holiday coefficients.
    pub holidays_prior_scale: f64,
    pub holidays: Vec<HolidaySpec>,
    /// Width of the prediction interval, in (0, 1).
    pub interval_width: f64,
    /// Number of simulated futures used to estimate the interval.
    pub uncertainty_samples: usize,
    /// Seed for the interval simulation.
    pub seed: u64,
    /// Default forecast horizon in days.
    pub horizon_days: usize,
    /// Days held out for validation during `fit` (0 disables it).
    pub validation_days: usize,
    /// Lower bound for point estimates and lower interval bounds.
    pub floor: Option<f64>,
    /// Capacity for logistic growth (defaults to 1.5 x the historical max).
    pub cap: Option<f64>,
    pub fill_policy: FillPolicy,
    pub duplicate_policy: DuplicatePolicy,
    /// Winsorize clicks and impressions beyond this many robust std devs.
    pub winsorize_sigma: Option<f64>,
    /// Residual std devs beyond which a day is flagged anomalous.
    pub anomaly_sigma: f64,
    pub export_charts: bool,
    /// Write an SVG copy of every chart next to the PNG.
    pub export_svg: bool,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            growth: Growth::Linear,
            changepoint_prior_scale: 0.05,
            changepoint_range: 0.9,
            n_changepoints: 25,
            seasonality_mode: SeasonalityMode::Multiplicative,
            yearly_seasonality: true,
            weekly_seasonality: true,
            monthly_seasonality: true,
            monthly_period: 30.5,
            monthly_fourier_order: 5,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            holidays: Vec::new(),
            interval_width: 0.95,
            uncertainty_samples: 1000,
            seed: 42,
            horizon_days: 90,
            validation_days: 60,
            floor: None,
            cap: None,
            fill_policy: FillPolicy::ForwardFill,
            duplicate_policy: DuplicatePolicy::Reject,
            winsorize_sigma: None,
            anomaly_sigma: 3.0,
            export_charts: true,
            export_svg: false,
            chart_width: 1000,
            chart_height: 600,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| TrafficError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TrafficError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_changepoint_prior_scale(mut self, scale: f64) -> Self {
        self.changepoint_prior_scale = scale;
        self
    }

    pub fn with_seasonality_mode(mut self, mode: SeasonalityMode) -> Self {
        self.seasonality_mode = mode;
        self
    }

    pub fn with_horizon_days(mut self, days: usize) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn with_validation_days(mut self, days: usize) -> Self {
        self.validation_days = days;
        self
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn with_cap(mut self, cap: f64) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = policy;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_winsorize_sigma(mut self, sigma: f64) -> Self {
        self.winsorize_sigma = Some(sigma);
        self
    }

    pub fn with_anomaly_sigma(mut self, sigma: f64) -> Self {
        self.anomaly_sigma = sigma;
        self
    }

    pub fn with_holiday(mut self, holiday: HolidaySpec) -> Self {
        self.holidays.push(holiday);
        self
    }

    pub fn with_uncertainty_samples(mut self, samples: usize) -> Self {
        self.uncertainty_samples = samples;
        self
    }

    pub fn with_charts(mut self, enabled: bool) -> Self {
        self.export_charts = enabled;
        self
    }

    pub fn with_svg(mut self, enabled: bool) -> Self {
        self.export_svg = enabled;
        self
    }

    /// Toggle the yearly, weekly and monthly seasonalities at once.
    pub fn with_seasonalities(mut self, yearly: bool, weekly: bool, monthly: bool) -> Self {
        self.yearly_seasonality = yearly;
        self.weekly_seasonality = weekly;
        self.monthly_seasonality = monthly;
        self
    }

    /// Check every option against its allowed range.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(TrafficError::Validation(format!(
                    "{name} must be a positive number, got {value}"
                )))
            }
        }

        positive("changepoint_prior_scale", self.changepoint_prior_scale)?;
        positive("seasonality_prior_scale", self.seasonality_prior_scale)?;
        positive("holidays_prior_scale", self.holidays_prior_scale)?;
        positive("monthly_period", self.monthly_period)?;
        positive("anomaly_sigma", self.anomaly_sigma)?;

        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(TrafficError::Validation(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(TrafficError::Validation(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        if self.horizon_days == 0 {
            return Err(TrafficError::Validation(
                "horizon_days must be greater than zero".to_string(),
            ));
        }
        if self.uncertainty_samples == 0 {
            return Err(TrafficError::Validation(
                "uncertainty_samples must be greater than zero".to_string(),
            ));
        }
        if let Some(sigma) = self.winsorize_sigma {
            if !(sigma.is_finite() && sigma >= 1.0) {
                return Err(TrafficError::Validation(format!(
                    "winsorize_sigma must be at least 1, got {sigma}"
                )));
            }
        }
        if let Some(floor) = self.floor {
            if !floor.is_finite() {
                return Err(TrafficError::Validation("floor must be finite".to_string()));
            }
        }
        if let Some(cap) = self.cap {
            positive("cap", cap)?;
            if let Some(floor) = self.floor {
                if cap <= floor {
                    return Err(TrafficError::Validation(format!(
                        "cap ({cap}) must be greater than floor ({floor})"
                    )));
                }
            }
        }
        if self.chart_width < 200 || self.chart_height < 150 {
            return Err(TrafficError::Validation(format!(
                "chart size {}x{} is too small",
                self.chart_width, self.chart_height
            )));
        }
        for holiday in &self.holidays {
            if holiday.name.trim().is_empty() {
                return Err(TrafficError::Validation(
                    "holiday name must not be empty".to_string(),
                ));
            }
            if holiday.lower_window > 0 || holiday.upper_window < 0 {
                return Err(TrafficError::Validation(format!(
                    "holiday '{}' needs lower_window <= 0 <= upper_window",
                    holiday.name
                )));
            }
        }
        Ok(())
    }
}

//! Summary statistics over the history and the model's fit.

use crate::config::Config;
use crate::core::{ForecastTable, HistoryTable};
use crate::error::{Result, TrafficError};
use crate::utils::stats::{mean, median, std_dev, variance};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

pub const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const WEEK: usize = 7;
const MONTH: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct BasicStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Coefficient of variation, `std / mean`.
    pub cv: f64,
}

/// Mean clicks of one group (weekday or calendar month).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMean {
    pub label: &'static str,
    pub average_clicks: f64,
    /// Percent above or below the mean of all group means.
    pub relative_strength: f64,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthMetrics {
    pub first_30_days_avg: f64,
    pub last_30_days_avg: f64,
    pub total_growth_pct: Option<f64>,
    /// Mean percent change between consecutive year-month averages.
    pub avg_monthly_growth_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalityStrength {
    pub weekly: f64,
    pub monthly: f64,
}

/// A history day whose clicks stray far from the fitted value.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub actual: f64,
    pub expected: f64,
    pub residual: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub week_over_week_pct: Option<f64>,
    pub month_over_month_pct: Option<f64>,
    pub anomalies: Vec<Anomaly>,
    pub basic: BasicStats,
    /// Monday first; weekdays absent from the history are left out.
    pub weekly_pattern: Vec<GroupMean>,
    /// January first; months absent from the history are left out.
    pub monthly_pattern: Vec<GroupMean>,
    pub growth: GrowthMetrics,
    pub seasonality: SeasonalityStrength,
    pub forecast_mean: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    anomaly_sigma: f64,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self { anomaly_sigma: 3.0 }
    }
}

impl Analyzer {
    pub fn new(anomaly_sigma: f64) -> Self {
        Self { anomaly_sigma }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.anomaly_sigma)
    }

    /// Summarize `history` against its in-sample `fitted` values and the
    /// future `forecast`. `fitted` must cover the history dates in order.
    pub fn analyze(
        &self,
        history: &HistoryTable,
        fitted: &ForecastTable,
        forecast: &ForecastTable,
    ) -> Result<AnalysisSummary> {
        if history.is_empty() {
            return Err(TrafficError::InsufficientData { needed: 1, got: 0 });
        }
        let clicks = history.clicks();
        if clicks.has_missing_values() {
            return Err(TrafficError::Validation(
                "clicks have missing values; preprocess before analysis".to_string(),
            ));
        }
        if fitted.dates() != clicks.dates() {
            return Err(TrafficError::Validation(format!(
                "fitted values cover {} dates but history has {}",
                fitted.len(),
                clicks.len()
            )));
        }
        let dates = clicks.dates();
        let values = clicks.values();

        let anomalies = self.anomalies(dates, values, &fitted.point_estimates());
        if !anomalies.is_empty() {
            tracing::warn!(count = anomalies.len(), sigma = self.anomaly_sigma, "anomalous days flagged");
        }

        let forecast_points = forecast.point_estimates();
        let summary = AnalysisSummary {
            week_over_week_pct: period_change(values, WEEK),
            month_over_month_pct: period_change(values, MONTH),
            anomalies,
            basic: basic_stats(values),
            weekly_pattern: group_means(
                dates,
                values,
                |d| d.weekday().num_days_from_monday() as usize,
                &WEEKDAY_NAMES,
            ),
            monthly_pattern: group_means(dates, values, |d| d.month0() as usize, &MONTH_NAMES),
            growth: growth_metrics(dates, values),
            seasonality: SeasonalityStrength {
                weekly: seasonality_strength(dates, values, |d| d.weekday().num_days_from_monday()),
                monthly: seasonality_strength(dates, values, |d| d.month0()),
            },
            forecast_mean: (!forecast_points.is_empty()).then(|| mean(&forecast_points)),
        };

        tracing::info!(
            wow = ?summary.week_over_week_pct,
            mom = ?summary.month_over_month_pct,
            mean_clicks = summary.basic.mean,
            "analysis complete"
        );
        Ok(summary)
    }

    fn anomalies(&self, dates: &[NaiveDate], actual: &[f64], expected: &[f64]) -> Vec<Anomaly> {
        let residuals: Vec<f64> = actual.iter().zip(expected).map(|(a, e)| a - e).collect();
        let sd = std_dev(&residuals);
        if !(sd.is_finite() && sd > 0.0) {
            return Vec::new();
        }
        let threshold = self.anomaly_sigma * sd;
        residuals
            .iter()
            .enumerate()
            .filter(|(_, r)| r.abs() > threshold)
            .map(|(i, &residual)| Anomaly {
                date: dates[i],
                actual: actual[i],
                expected: expected[i],
                residual,
                z_score: residual / sd,
            })
            .collect()
    }
}

/// Percent change of the last `window` values against the `window` before.
pub fn period_change(values: &[f64], window: usize) -> Option<f64> {
    let n = values.len();
    if window == 0 || n < 2 * window {
        return None;
    }
    let current: f64 = values[n - window..].iter().sum();
    let previous: f64 = values[n - 2 * window..n - window].iter().sum();
    if previous == 0.0 {
        return None;
    }
    Some((current / previous - 1.0) * 100.0)
}

fn basic_stats(values: &[f64]) -> BasicStats {
    let m = mean(values);
    let std = if values.len() < 2 { 0.0 } else { std_dev(values) };
    BasicStats {
        mean: m,
        median: median(values),
        std,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        cv: if m != 0.0 { std / m } else { f64::NAN },
    }
}

fn group_means(
    dates: &[NaiveDate],
    values: &[f64],
    key: impl Fn(&NaiveDate) -> usize,
    labels: &[&'static str],
) -> Vec<GroupMean> {
    let mut sums = vec![(0.0_f64, 0usize); labels.len()];
    for (d, v) in dates.iter().zip(values) {
        let slot = &mut sums[key(d)];
        slot.0 += *v;
        slot.1 += 1;
    }
    let present: Vec<(usize, f64, usize)> = sums
        .iter()
        .enumerate()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(i, &(sum, count))| (i, sum / count as f64, count))
        .collect();
    let overall = mean(&present.iter().map(|p| p.1).collect::<Vec<_>>());

    present
        .into_iter()
        .map(|(i, average_clicks, days)| GroupMean {
            label: labels[i],
            average_clicks,
            relative_strength: if overall != 0.0 {
                (average_clicks / overall - 1.0) * 100.0
            } else {
                0.0
            },
            days,
        })
        .collect()
}

fn growth_metrics(dates: &[NaiveDate], values: &[f64]) -> GrowthMetrics {
    let head = &values[..values.len().min(MONTH)];
    let tail = &values[values.len().saturating_sub(MONTH)..];
    let first = mean(head);
    let last = mean(tail);

    let mut by_month: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for (d, v) in dates.iter().zip(values) {
        let slot = by_month.entry((d.year(), d.month())).or_insert((0.0, 0));
        slot.0 += v;
        slot.1 += 1;
    }
    let month_means: Vec<f64> = by_month.values().map(|(s, c)| s / *c as f64).collect();
    let changes: Vec<f64> = month_means
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    GrowthMetrics {
        first_30_days_avg: first,
        last_30_days_avg: last,
        total_growth_pct: (first != 0.0).then(|| (last / first - 1.0) * 100.0),
        avg_monthly_growth_pct: (!changes.is_empty()).then(|| mean(&changes) * 100.0),
    }
}

/// `sqrt(var(group means) / var(values))`; zero when either is undefined.
fn seasonality_strength<K: Ord>(
    dates: &[NaiveDate],
    values: &[f64],
    key: impl Fn(&NaiveDate) -> K,
) -> f64 {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (d, v) in dates.iter().zip(values) {
        groups.entry(key(d)).or_default().push(*v);
    }
    let group_means: Vec<f64> = groups.values().map(|g| mean(g)).collect();
    let between = variance(&group_means);
    let total = variance(values);
    if between.is_finite() && total.is_finite() && total > 0.0 {
        (between / total).sqrt()
    } else {
        0.0
    }
}

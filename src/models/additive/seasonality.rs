//! Fourier seasonal blocks and holiday indicator columns.

use crate::config::{Config, HolidaySpec};
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

pub const YEARLY_PERIOD: f64 = 365.25;
pub const YEARLY_ORDER: usize = 10;
pub const WEEKLY_PERIOD: f64 = 7.0;
pub const WEEKLY_ORDER: usize = 3;

/// Source of a block's design columns.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Fourier { period: f64, order: usize },
    Holiday(HolidaySpec),
}

/// A group of regressors reported as one model component.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalBlock {
    pub name: String,
    pub kind: BlockKind,
    pub prior_scale: f64,
}

impl SeasonalBlock {
    pub fn fourier(name: &str, period: f64, order: usize, prior_scale: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: BlockKind::Fourier { period, order },
            prior_scale,
        }
    }

    /// Name of the component this block contributes to. Holidays share one.
    pub fn component(&self) -> &str {
        match self.kind {
            BlockKind::Fourier { .. } => &self.name,
            BlockKind::Holiday(_) => "holidays",
        }
    }

    pub fn width(&self) -> usize {
        match &self.kind {
            BlockKind::Fourier { order, .. } => 2 * order,
            BlockKind::Holiday(_) => 1,
        }
    }

    /// Design columns for the given dates.
    pub fn columns(&self, dates: &[NaiveDate]) -> Vec<Vec<f64>> {
        match &self.kind {
            BlockKind::Fourier { period, order } => {
                let days: Vec<f64> = dates.iter().map(|d| day_number(*d)).collect();
                fourier_columns(&days, *period, *order)
            }
            BlockKind::Holiday(holiday) => vec![dates
                .iter()
                .map(|d| if holiday.covers(*d) { 1.0 } else { 0.0 })
                .collect()],
        }
    }

    /// Ridge penalty for this block's coefficients.
    pub fn penalty(&self) -> f64 {
        1.0 / (self.prior_scale * self.prior_scale)
    }
}

/// Absolute day number, so seasonal phase does not depend on where the
/// history starts.
pub fn day_number(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

/// `sin(2 pi k d / period)` and `cos(2 pi k d / period)` for k = 1..=order.
pub fn fourier_columns(days: &[f64], period: f64, order: usize) -> Vec<Vec<f64>> {
    let mut columns = Vec::with_capacity(2 * order);
    for k in 1..=order {
        let w = 2.0 * PI * k as f64 / period;
        columns.push(days.iter().map(|d| (w * d).sin()).collect());
        columns.push(days.iter().map(|d| (w * d).cos()).collect());
    }
    columns
}

/// Blocks enabled by `config` that the history can support.
///
/// A Fourier block needs at least one full period of history; a holiday
/// block needs at least one covered history date.
pub fn active_blocks(config: &Config, history: &[NaiveDate], span_days: f64) -> Vec<SeasonalBlock> {
    let scale = config.seasonality_prior_scale;
    let candidates = [
        (config.yearly_seasonality, "yearly", YEARLY_PERIOD, YEARLY_ORDER),
        (config.weekly_seasonality, "weekly", WEEKLY_PERIOD, WEEKLY_ORDER),
        (
            config.monthly_seasonality,
            "monthly",
            config.monthly_period,
            config.monthly_fourier_order,
        ),
    ];

    let mut blocks: Vec<SeasonalBlock> = candidates
        .iter()
        .filter(|(enabled, _, period, order)| *enabled && *order > 0 && span_days >= *period)
        .map(|&(_, name, period, order)| SeasonalBlock::fourier(name, period, order, scale))
        .collect();

    for holiday in &config.holidays {
        if history.iter().any(|d| holiday.covers(*d)) {
            blocks.push(SeasonalBlock {
                name: holiday.name.clone(),
                kind: BlockKind::Holiday(holiday.clone()),
                prior_scale: config.holidays_prior_scale,
            });
        } else {
            tracing::debug!(holiday = %holiday.name, "holiday never occurs in history, skipped");
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    #[test]
    fn fourier_columns_are_periodic() {
        let days: Vec<f64> = (0..15).map(|d| d as f64).collect();
        let cols = fourier_columns(&days, 7.0, 3);
        assert_eq!(cols.len(), 6);
        for col in &cols {
            assert_relative_eq!(col[0], col[7], epsilon = 1e-9);
            assert_relative_eq!(col[3], col[10], epsilon = 1e-9);
        }
        // sin starts at zero, cos at one
        assert_relative_eq!(cols[0][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(cols[1][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn blocks_require_a_full_period() {
        let config = Config::default();
        let history: Vec<NaiveDate> = (0..60).map(day).collect();
        let names: Vec<String> = active_blocks(&config, &history, 59.0)
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["weekly", "monthly"]);

        let names: Vec<String> = active_blocks(&config, &history, 400.0)
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["yearly", "weekly", "monthly"]);

        let none = Config::default().with_seasonalities(false, false, false);
        assert!(active_blocks(&none, &history, 400.0).is_empty());
    }

    #[test]
    fn holiday_block_marks_window() {
        let holiday = HolidaySpec::new("launch", vec![day(10)]).with_windows(-1, 1);
        let config = Config::default()
            .with_seasonalities(false, false, false)
            .with_holiday(holiday);
        let history: Vec<NaiveDate> = (0..20).map(day).collect();
        let blocks = active_blocks(&config, &history, 19.0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].component(), "holidays");
        assert_eq!(blocks[0].width(), 1);

        let col = &blocks[0].columns(&history)[0];
        let marked: Vec<usize> = (0..20).filter(|&i| col[i] == 1.0).collect();
        assert_eq!(marked, vec![9, 10, 11]);
    }

    #[test]
    fn holiday_outside_history_is_skipped() {
        let holiday = HolidaySpec::new("later", vec![day(100)]);
        let config = Config::default().with_holiday(holiday);
        let history: Vec<NaiveDate> = (0..20).map(day).collect();
        assert!(active_blocks(&config, &history, 19.0)
            .iter()
            .all(|b| b.name != "later"));
    }
}

//! Traffic records and the calendar features derived from them.

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;

/// One of the four metrics carried by a traffic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Clicks,
    Impressions,
    Ctr,
    Position,
}

impl Metric {
    /// All metrics in input-column order.
    pub const ALL: [Metric; 4] = [
        Metric::Clicks,
        Metric::Impressions,
        Metric::Ctr,
        Metric::Position,
    ];

    /// Column header used in the input export.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Clicks => "Clicks",
            Metric::Impressions => "Impressions",
            Metric::Ctr => "CTR",
            Metric::Position => "Position",
        }
    }

    /// Whether the metric holds whole counts.
    pub fn is_count(&self) -> bool {
        matches!(self, Metric::Clicks | Metric::Impressions)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A single day of search traffic.
///
/// Metrics are `None` when the export left the cell empty; the
/// preprocessor fills every gap before modelling.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    pub date: NaiveDate,
    pub clicks: Option<u64>,
    pub impressions: Option<u64>,
    /// Click-through rate as a unit fraction in [0, 1].
    pub ctr: Option<f64>,
    /// Average ranking position (1 = top).
    pub position: Option<f64>,
}

impl TrafficRecord {
    /// A fully observed record.
    pub fn new(date: NaiveDate, clicks: u64, impressions: u64, ctr: f64, position: f64) -> Self {
        Self {
            date,
            clicks: Some(clicks),
            impressions: Some(impressions),
            ctr: Some(ctr),
            position: Some(position),
        }
    }

    /// A record with every metric missing.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            clicks: None,
            impressions: None,
            ctr: None,
            position: None,
        }
    }

    /// Read a metric as a float.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Clicks => self.clicks.map(|v| v as f64),
            Metric::Impressions => self.impressions.map(|v| v as f64),
            Metric::Ctr => self.ctr,
            Metric::Position => self.position,
        }
    }

    /// Write a metric from a float. Counts are rounded and clamped at zero.
    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Clicks => self.clicks = Some(value.round().max(0.0) as u64),
            Metric::Impressions => self.impressions = Some(value.round().max(0.0) as u64),
            Metric::Ctr => self.ctr = Some(value),
            Metric::Position => self.position = Some(value),
        }
    }

    /// True when no metric is missing.
    pub fn is_complete(&self) -> bool {
        Metric::ALL.iter().all(|&m| self.get(m).is_some())
    }
}

/// Calendar and ratio features derived for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarFeatures {
    /// 0 = Monday ... 6 = Sunday.
    pub day_of_week: u32,
    pub day_of_month: u32,
    /// ISO 8601 week number.
    pub week_of_year: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    pub is_weekend: bool,
    pub is_month_start: bool,
    pub is_month_end: bool,
    /// Clicks divided by impressions (0 when there were no impressions).
    pub clicks_per_impression: f64,
    /// Reciprocal of the average position.
    pub position_impact: f64,
}

impl CalendarFeatures {
    /// Derive the features of a record. Missing metrics yield zero ratios.
    pub fn derive(record: &TrafficRecord) -> Self {
        let date = record.date;
        let day_of_week = date.weekday().num_days_from_monday();
        let is_month_end = date
            .succ_opt()
            .map(|next| next.month() != date.month())
            .unwrap_or(true);

        let clicks_per_impression = match (record.clicks, record.impressions) {
            (Some(c), Some(i)) if i > 0 => c as f64 / i as f64,
            _ => 0.0,
        };
        let position_impact = match record.position {
            Some(p) if p > 0.0 => 1.0 / p,
            _ => 0.0,
        };

        Self {
            day_of_week,
            day_of_month: date.day(),
            week_of_year: date.iso_week().week(),
            month: date.month(),
            quarter: (date.month() - 1) / 3 + 1,
            year: date.year(),
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_month_start: date.day() == 1,
            is_month_end,
            clicks_per_impression,
            position_impact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn record_get_and_set_round_trip_counts() {
        let mut record = TrafficRecord::empty(date(2024, 3, 1));
        assert!(!record.is_complete());
        assert_eq!(record.get(Metric::Clicks), None);

        record.set(Metric::Clicks, 12.6);
        record.set(Metric::Impressions, -4.0);
        record.set(Metric::Ctr, 0.02);
        record.set(Metric::Position, 7.5);

        assert_eq!(record.clicks, Some(13));
        assert_eq!(record.impressions, Some(0));
        assert!(record.is_complete());
        assert_eq!(record.get(Metric::Position), Some(7.5));
    }

    #[test]
    fn calendar_features_for_weekend_month_end() {
        // 2024-03-31 is a Sunday and the last day of March
        let record = TrafficRecord::new(date(2024, 3, 31), 50, 1000, 0.05, 4.0);
        let features = CalendarFeatures::derive(&record);

        assert_eq!(features.day_of_week, 6);
        assert!(features.is_weekend);
        assert!(features.is_month_end);
        assert!(!features.is_month_start);
        assert_eq!(features.month, 3);
        assert_eq!(features.quarter, 1);
        assert_eq!(features.year, 2024);
        assert_eq!(features.week_of_year, 13);
        assert_relative_eq!(features.clicks_per_impression, 0.05, epsilon = 1e-12);
        assert_relative_eq!(features.position_impact, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn calendar_features_for_weekday_month_start() {
        // 2024-10-01 is a Tuesday
        let record = TrafficRecord::new(date(2024, 10, 1), 0, 0, 0.0, 12.0);
        let features = CalendarFeatures::derive(&record);

        assert_eq!(features.day_of_week, 1);
        assert!(!features.is_weekend);
        assert!(features.is_month_start);
        assert_eq!(features.quarter, 4);
        assert_eq!(features.clicks_per_impression, 0.0);
    }

    #[test]
    fn leap_day_is_not_month_end() {
        let feb28 = CalendarFeatures::derive(&TrafficRecord::empty(date(2024, 2, 28)));
        let feb29 = CalendarFeatures::derive(&TrafficRecord::empty(date(2024, 2, 29)));
        assert!(!feb28.is_month_end);
        assert!(feb29.is_month_end);
    }
}

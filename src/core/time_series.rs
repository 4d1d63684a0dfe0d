//! Daily time series used as model input.

use crate::error::{Result, TrafficError};
use chrono::NaiveDate;

/// Policy for handling missing values (NaN/Inf).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissingValuePolicy {
    /// Fill with a specific value.
    Fill(f64),
    /// Carry the previous valid value forward; leading gaps take the
    /// first valid value.
    ForwardFill,
    /// Linear interpolation in calendar time; edges hold the nearest
    /// valid value.
    Interpolate,
    /// Return error if missing values found.
    Error,
}

/// A univariate series indexed by calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    label: String,
}

impl TimeSeries {
    /// Create a series. Dates must be strictly increasing and match the values in length.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(TrafficError::Validation(format!(
                "series has {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(TrafficError::Validation(format!(
                "dates must be strictly increasing ({} follows {})",
                w[1], w[0]
            )));
        }
        Ok(Self {
            dates,
            values,
            label: String::new(),
        })
    }

    /// Build from dates already known to be strictly increasing.
    pub(crate) fn from_sorted(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(dates.len(), values.len());
        Self {
            dates,
            values,
            label: String::new(),
        }
    }

    /// Attach a label (the metric name, for log lines and chart captions).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Days between the first and last observation (0 for fewer than two points).
    pub fn span_days(&self) -> i64 {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => (last - first).num_days(),
            _ => 0,
        }
    }

    /// Extract the observations `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start > end || end > self.len() {
            return Err(TrafficError::Validation(format!(
                "slice {}..{} out of bounds for series of length {}",
                start,
                end,
                self.len()
            )));
        }
        Ok(TimeSeries {
            dates: self.dates[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            label: self.label.clone(),
        })
    }

    /// Observations whose date falls in `[from, to]`.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> TimeSeries {
        let start = self.dates.partition_point(|d| *d < from);
        let end = self.dates.partition_point(|d| *d <= to);
        let end = end.max(start);
        TimeSeries {
            dates: self.dates[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            label: self.label.clone(),
        }
    }

    /// Check if series has missing values (NaN or Inf).
    pub fn has_missing_values(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Return a sanitized copy with missing values handled.
    ///
    /// A series with no valid value at all cannot be repaired and is an error
    /// under every policy except `Fill`.
    pub fn sanitized(&self, policy: MissingValuePolicy) -> Result<TimeSeries> {
        if !self.has_missing_values() {
            return Ok(self.clone());
        }
        let all_missing = self.values.iter().all(|v| !v.is_finite());
        let values = match policy {
            MissingValuePolicy::Error => {
                return Err(TrafficError::Validation(format!(
                    "{} contains missing values",
                    self.describe()
                )));
            }
            MissingValuePolicy::Fill(fill) => self
                .values
                .iter()
                .map(|&v| if v.is_finite() { v } else { fill })
                .collect(),
            _ if all_missing => {
                return Err(TrafficError::Validation(format!(
                    "{} has no observed values",
                    self.describe()
                )));
            }
            MissingValuePolicy::ForwardFill => forward_fill(&self.values),
            MissingValuePolicy::Interpolate => interpolate_by_date(&self.dates, &self.values),
        };
        Ok(TimeSeries {
            dates: self.dates.clone(),
            values,
            label: self.label.clone(),
        })
    }

    fn describe(&self) -> String {
        if self.label.is_empty() {
            "series".to_string()
        } else {
            format!("column {}", self.label)
        }
    }
}

fn forward_fill(values: &[f64]) -> Vec<f64> {
    let first_valid = values.iter().copied().find(|v| v.is_finite());
    let mut last_valid = first_valid;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                last_valid = Some(v);
                v
            } else {
                last_valid.unwrap_or(f64::NAN)
            }
        })
        .collect()
}

/// Fill each run of missing values on a straight line between its valid
/// neighbours, weighting by the number of days rather than the row count.
fn interpolate_by_date(dates: &[NaiveDate], values: &[f64]) -> Vec<f64> {
    let mut result = values.to_vec();
    let n = result.len();
    let mut i = 0;
    while i < n {
        if result[i].is_finite() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && !result[i].is_finite() {
            i += 1;
        }
        let end = i;

        let left = start.checked_sub(1).map(|j| (dates[j], result[j]));
        let right = (end < n).then(|| (dates[end], result[end]));

        match (left, right) {
            (Some((dl, vl)), Some((dr, vr))) => {
                let width = (dr - dl).num_days() as f64;
                for idx in start..end {
                    let t = (dates[idx] - dl).num_days() as f64 / width;
                    result[idx] = vl + t * (vr - vl);
                }
            }
            (Some((_, vl)), None) => result[start..end].fill(vl),
            (None, Some((_, vr))) => result[start..end].fill(vr),
            (None, None) => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn new_rejects_unsorted_dates() {
        let mut dates = days(3);
        dates.swap(1, 2);
        let result = TimeSeries::new(dates, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(TrafficError::Validation(_))));
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let result = TimeSeries::new(days(3), vec![1.0, 2.0]);
        assert!(matches!(result, Err(TrafficError::Validation(_))));
    }

    #[test]
    fn span_and_bounds() {
        let ts = TimeSeries::new(days(10), vec![0.0; 10]).unwrap();
        assert_eq!(ts.span_days(), 9);
        assert_eq!(ts.first_date(), Some(days(1)[0]));
        assert_eq!(ts.last_date(), Some(days(10)[9]));
    }

    #[test]
    fn slice_and_between() {
        let ts = TimeSeries::new(days(10), (0..10).map(|v| v as f64).collect()).unwrap();
        let head = ts.slice(0, 3).unwrap();
        assert_eq!(head.values(), &[0.0, 1.0, 2.0]);
        assert!(ts.slice(4, 11).is_err());

        let dates = days(10);
        let window = ts.between(dates[2], dates[5]);
        assert_eq!(window.values(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn forward_fill_backfills_leading_gap() {
        let ts = TimeSeries::new(days(5), vec![f64::NAN, 2.0, f64::NAN, f64::NAN, 5.0]).unwrap();
        let filled = ts.sanitized(MissingValuePolicy::ForwardFill).unwrap();
        assert_eq!(filled.values(), &[2.0, 2.0, 2.0, 2.0, 5.0]);
    }

    #[test]
    fn interpolation_weights_by_calendar_days() {
        let all = days(5);
        // Rows for day 0, 1 and 4; day 1 is missing, so the line runs from day 0 to day 4
        let dates = vec![all[0], all[1], all[4]];
        let ts = TimeSeries::new(dates, vec![0.0, f64::NAN, 8.0]).unwrap();
        let filled = ts.sanitized(MissingValuePolicy::Interpolate).unwrap();
        assert_relative_eq!(filled.values()[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn interpolation_holds_edges() {
        let ts = TimeSeries::new(days(4), vec![f64::NAN, 1.0, 3.0, f64::NAN]).unwrap();
        let filled = ts.sanitized(MissingValuePolicy::Interpolate).unwrap();
        assert_eq!(filled.values(), &[1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn all_missing_is_an_error() {
        let ts = TimeSeries::new(days(3), vec![f64::NAN; 3])
            .unwrap()
            .with_label("Position");
        let err = ts.sanitized(MissingValuePolicy::ForwardFill).unwrap_err();
        assert!(err.to_string().contains("Position"));

        let filled = ts.sanitized(MissingValuePolicy::Fill(0.0)).unwrap();
        assert_eq!(filled.values(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn error_policy_rejects_missing() {
        let ts = TimeSeries::new(days(2), vec![1.0, f64::NAN]).unwrap();
        assert!(ts.sanitized(MissingValuePolicy::Error).is_err());
        let clean = TimeSeries::new(days(2), vec![1.0, 2.0]).unwrap();
        assert!(clean.sanitized(MissingValuePolicy::Error).is_ok());
    }
}

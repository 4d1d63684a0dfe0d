//! The ordered table of daily traffic records.

use super::record::{CalendarFeatures, Metric, TrafficRecord};
use super::time_series::TimeSeries;
use crate::error::{Result, TrafficError};
use chrono::NaiveDate;

/// Traffic history ordered by strictly increasing date.
///
/// Created by the loader; only the preprocessor fills gaps and attaches
/// calendar features. Every later stage reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    records: Vec<TrafficRecord>,
    features: Vec<CalendarFeatures>,
}

impl HistoryTable {
    /// Build a table, checking that dates are strictly increasing.
    pub fn new(records: Vec<TrafficRecord>) -> Result<Self> {
        if let Some(w) = records.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(TrafficError::Validation(if w[1].date == w[0].date {
                format!("duplicate date {}", w[1].date)
            } else {
                format!("dates out of order: {} follows {}", w[1].date, w[0].date)
            }));
        }
        Ok(Self {
            records,
            features: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TrafficRecord] {
        &self.records
    }

    /// Calendar features, present once the table has been preprocessed.
    pub fn features(&self) -> Option<&[CalendarFeatures]> {
        if self.features.is_empty() && !self.records.is_empty() {
            None
        } else {
            Some(&self.features)
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Count of missing cells per metric.
    pub fn missing_counts(&self) -> Vec<(Metric, usize)> {
        Metric::ALL
            .iter()
            .map(|&m| {
                let count = self.records.iter().filter(|r| r.get(m).is_none()).count();
                (m, count)
            })
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.records.iter().any(|r| !r.is_complete())
    }

    /// A metric as a dated series; missing cells become NaN.
    pub fn series(&self, metric: Metric) -> TimeSeries {
        let values = self
            .records
            .iter()
            .map(|r| r.get(metric).unwrap_or(f64::NAN))
            .collect();
        TimeSeries::from_sorted(self.dates(), values).with_label(metric.column())
    }

    /// Clicks as the model target.
    pub fn clicks(&self) -> TimeSeries {
        self.series(Metric::Clicks)
    }

    /// Replace one metric column. `values` must match the table length.
    pub(crate) fn set_column(&mut self, metric: Metric, values: &[f64]) {
        debug_assert_eq!(values.len(), self.records.len());
        for (record, &v) in self.records.iter_mut().zip(values) {
            if v.is_finite() {
                record.set(metric, v);
            }
        }
    }

    pub(crate) fn set_features(&mut self, features: Vec<CalendarFeatures>) {
        debug_assert_eq!(features.len(), self.records.len());
        self.features = features;
    }

    /// Records whose date falls in `[from, to]`, without features.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> HistoryTable {
        let start = self.records.partition_point(|r| r.date < from);
        let end = self.records.partition_point(|r| r.date <= to).max(start);
        HistoryTable {
            records: self.records[start..end].to_vec(),
            features: Vec::new(),
        }
    }
}

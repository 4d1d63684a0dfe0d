//! Reading and writing `predictions.csv`.

use crate::core::{ForecastPoint, ForecastTable};
use crate::error::{Result, TrafficError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One line of `predictions.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl From<&ForecastPoint> for PredictionRow {
    fn from(point: &ForecastPoint) -> Self {
        Self {
            date: point.date,
            predicted: point.point_estimate,
            lower_bound: point.lower_bound,
            upper_bound: point.upper_bound,
        }
    }
}

impl From<PredictionRow> for ForecastPoint {
    fn from(row: PredictionRow) -> Self {
        Self {
            date: row.date,
            point_estimate: row.predicted,
            lower_bound: row.lower_bound,
            upper_bound: row.upper_bound,
        }
    }
}

/// Write `table` with the header `date,predicted,lower_bound,upper_bound`.
///
/// Floats are written in their shortest round-trip form, so reading the
/// file back yields the same values.
pub fn write_predictions(path: impl AsRef<Path>, table: &ForecastTable) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| TrafficError::io(path, e))?;
    if table.is_empty() {
        writer
            .write_record(["date", "predicted", "lower_bound", "upper_bound"])
            .map_err(|e| TrafficError::io(path, e))?;
    }
    for point in table.rows() {
        writer
            .serialize(PredictionRow::from(point))
            .map_err(|e| TrafficError::io(path, e))?;
    }
    writer.flush().map_err(|e| TrafficError::io(path, e))?;
    tracing::info!(path = %path.display(), rows = table.len(), "predictions written");
    Ok(())
}

/// Read a file produced by [`write_predictions`].
pub fn read_predictions(path: impl AsRef<Path>) -> Result<ForecastTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TrafficError::io(path, e))?;

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<PredictionRow>().enumerate() {
        let row = result.map_err(|e| TrafficError::Parse {
            // header is line 1
            line: e.position().map(|p| p.line()).unwrap_or(i as u64 + 2),
            column: "row".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        rows.push(ForecastPoint::from(row));
    }
    if rows.windows(2).any(|w| w[0].date >= w[1].date) {
        return Err(TrafficError::Validation(format!(
            "{}: prediction dates are not strictly increasing",
            path.display()
        )));
    }
    Ok(ForecastTable::from_rows(rows))
}

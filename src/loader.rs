//! CSV ingestion of search-console performance exports.

use crate::config::{Config, DuplicatePolicy};
use crate::core::{HistoryTable, Metric, TrafficRecord};
use crate::error::{Result, TrafficError};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const DATE_COLUMN: &str = "Date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads the daily export into a [`HistoryTable`].
#[derive(Debug, Clone)]
pub struct Loader {
    delimiter: u8,
    duplicate_policy: DuplicatePolicy,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            delimiter: b',',
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader using the duplicate policy from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::default().with_duplicate_policy(config.duplicate_policy)
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Load a file from disk.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<HistoryTable> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TrafficError::io(path, e))?;
        let table = self.load_from_reader(BufReader::new(file))?;
        tracing::info!(path = %path.display(), rows = table.len(), "loaded traffic history");
        Ok(table)
    }

    /// Load from any reader; used directly by tests and callers holding
    /// the data in memory.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<HistoryTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| TrafficError::Validation(format!("cannot read CSV header: {e}")))?
            .clone();
        let columns = ColumnIndex::resolve(&headers)?;

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| TrafficError::Validation(format!("malformed CSV: {e}")))?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            records.push(columns.parse_row(&row, line)?);
        }

        // Exports usually arrive newest-first
        records.sort_by_key(|r| r.date);
        let records = self.apply_duplicate_policy(records)?;
        HistoryTable::new(records)
    }

    fn apply_duplicate_policy(&self, records: Vec<TrafficRecord>) -> Result<Vec<TrafficRecord>> {
        let mut kept: Vec<TrafficRecord> = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        for record in records {
            match kept.last() {
                Some(prev) if prev.date == record.date => match self.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        return Err(TrafficError::Validation(format!(
                            "duplicate date {}",
                            record.date
                        )))
                    }
                    DuplicatePolicy::KeepFirst => dropped += 1,
                },
                _ => kept.push(record),
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "dropped rows with repeated dates");
        }
        Ok(kept)
    }
}

/// Positions of the required columns in the header.
struct ColumnIndex {
    date: usize,
    metrics: [(Metric, usize); 4],
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_header(name), idx))
            .collect();

        let find = |column: &str| {
            map.get(column).copied().ok_or_else(|| TrafficError::Schema {
                column: column.to_string(),
            })
        };

        Ok(Self {
            date: find(DATE_COLUMN)?,
            metrics: [
                (Metric::Clicks, find(Metric::Clicks.column())?),
                (Metric::Impressions, find(Metric::Impressions.column())?),
                (Metric::Ctr, find(Metric::Ctr.column())?),
                (Metric::Position, find(Metric::Position.column())?),
            ],
        })
    }

    fn parse_row(&self, row: &StringRecord, line: u64) -> Result<TrafficRecord> {
        let cell = |idx: usize| row.get(idx).unwrap_or("").trim();

        let raw_date = cell(self.date);
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|e| {
            TrafficError::Parse {
                line,
                column: DATE_COLUMN.to_string(),
                value: raw_date.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut record = TrafficRecord::empty(date);
        for &(metric, idx) in &self.metrics {
            let raw = cell(idx);
            if raw.is_empty() {
                continue;
            }
            let parse_err = |reason: &str| TrafficError::Parse {
                line,
                column: metric.column().to_string(),
                value: raw.to_string(),
                reason: reason.to_string(),
            };
            match metric {
                Metric::Clicks => record.clicks = Some(parse_count(raw).map_err(parse_err)?),
                Metric::Impressions => {
                    record.impressions = Some(parse_count(raw).map_err(parse_err)?)
                }
                Metric::Ctr => {
                    let ctr = parse_ctr(raw).map_err(parse_err)?;
                    if !(0.0..=1.0).contains(&ctr) {
                        return Err(TrafficError::Validation(format!(
                            "CTR '{raw}' on line {line} is outside [0%, 100%]"
                        )));
                    }
                    record.ctr = Some(ctr);
                }
                Metric::Position => {
                    let position = parse_number(raw).map_err(parse_err)?;
                    if position <= 0.0 {
                        return Err(TrafficError::Validation(format!(
                            "Position '{raw}' on line {line} must be greater than zero"
                        )));
                    }
                    record.position = Some(position);
                }
            }
        }
        Ok(record)
    }
}

/// Trim whitespace and a UTF-8 byte-order mark some spreadsheet tools prepend.
fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn parse_number(raw: &str) -> std::result::Result<f64, &'static str> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err("not a number"),
    }
}

/// Non-negative whole count; `12.0` and `1,234` are accepted.
fn parse_count(raw: &str) -> std::result::Result<u64, &'static str> {
    let value = parse_number(raw)?;
    if value < 0.0 {
        return Err("count cannot be negative");
    }
    if value.fract() != 0.0 {
        return Err("count must be a whole number");
    }
    Ok(value as u64)
}

/// `"2.09%"` becomes 0.0209; a bare number is already a fraction.
fn parse_ctr(raw: &str) -> std::result::Result<f64, &'static str> {
    match raw.strip_suffix('%') {
        Some(percent) => parse_number(percent.trim()).map(|v| v / 100.0),
        None => parse_number(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "Date,Clicks,Impressions,CTR,Position\n";

    fn load(body: &str) -> Result<HistoryTable> {
        Loader::new().load_from_reader(format!("{HEADER}{body}").as_bytes())
    }

    #[test]
    fn parses_and_sorts_rows() {
        let table = load(
            "2024-01-03,15,500,3%,4.2\n\
             2024-01-01,10,400,2.5%,5.0\n\
             2024-01-02,12,450,2.67%,4.8\n",
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        let first = &table.records()[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(first.clicks, Some(10));
        assert_eq!(first.impressions, Some(400));
        assert_relative_eq!(first.ctr.unwrap(), 0.025, epsilon = 1e-12);
        assert_relative_eq!(first.position.unwrap(), 5.0);
    }

    #[test]
    fn missing_column_is_schema_error() {
        let result = Loader::new()
            .load_from_reader("Date,Clicks,Impressions,CTR\n2024-01-01,1,2,3%\n".as_bytes());
        assert_eq!(
            result.unwrap_err(),
            TrafficError::Schema {
                column: "Position".to_string()
            }
        );
    }

    #[test]
    fn headers_are_trimmed_and_extras_ignored() {
        let data = "\u{feff}Date , Clicks,Impressions ,CTR,Position,Country\n\
                    2024-01-01,1,2,50%,1.5,US\n";
        let table = Loader::new().load_from_reader(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
        assert_relative_eq!(table.records()[0].ctr.unwrap(), 0.5);
    }

    #[test]
    fn bad_cell_reports_line_column_and_value() {
        let err = load("2024-01-01,10,400,2%,5\n2024-01-02,abc,400,2%,5\n").unwrap_err();
        assert_eq!(
            err,
            TrafficError::Parse {
                line: 3,
                column: "Clicks".to_string(),
                value: "abc".to_string(),
                reason: "not a number".to_string(),
            }
        );

        let err = load("2024-13-01,10,400,2%,5\n").unwrap_err();
        assert!(matches!(err, TrafficError::Parse { ref column, .. } if column == "Date"));
    }

    #[test]
    fn counts_accept_thousands_and_trailing_zero() {
        let table = load("2024-01-01,\"1,234\",5000.0,24.68%,3\n").unwrap();
        assert_eq!(table.records()[0].clicks, Some(1234));
        assert_eq!(table.records()[0].impressions, Some(5000));

        assert!(matches!(
            load("2024-01-01,-3,10,1%,3\n"),
            Err(TrafficError::Parse { .. })
        ));
        assert!(matches!(
            load("2024-01-01,2.5,10,1%,3\n"),
            Err(TrafficError::Parse { .. })
        ));
    }

    #[test]
    fn ctr_without_percent_is_a_fraction() {
        let table = load("2024-01-01,1,100,0.01,3\n").unwrap();
        assert_relative_eq!(table.records()[0].ctr.unwrap(), 0.01);

        assert!(matches!(
            load("2024-01-01,1,100,150%,3\n"),
            Err(TrafficError::Validation(_))
        ));
    }

    #[test]
    fn position_must_be_positive() {
        assert!(matches!(
            load("2024-01-01,1,100,1%,0\n"),
            Err(TrafficError::Validation(_))
        ));
    }

    #[test]
    fn empty_cells_are_missing() {
        let table = load("2024-01-01,,100,,3\n").unwrap();
        let record = &table.records()[0];
        assert_eq!(record.clicks, None);
        assert_eq!(record.ctr, None);
        assert_eq!(record.impressions, Some(100));
    }

    #[test]
    fn duplicate_dates_follow_policy() {
        let body = "2024-01-01,1,100,1%,3\n2024-01-02,2,100,2%,3\n2024-01-01,9,100,9%,3\n";
        let err = load(body).unwrap_err();
        assert_eq!(
            err,
            TrafficError::Validation("duplicate date 2024-01-01".to_string())
        );

        let table = Loader::new()
            .with_duplicate_policy(DuplicatePolicy::KeepFirst)
            .load_from_reader(format!("{HEADER}{body}").as_bytes())
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].clicks, Some(1));
    }

    #[test]
    fn semicolon_delimiter() {
        let data = "Date;Clicks;Impressions;CTR;Position\n2024-01-01;1;100;1%;3\n";
        let table = Loader::new()
            .with_delimiter(b';')
            .load_from_reader(data.as_bytes())
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Loader::new().load("/nonexistent/dir/traffic.csv").unwrap_err();
        assert!(matches!(err, TrafficError::Io { ref path, .. } if path.contains("traffic.csv")));
    }

    #[test]
    fn header_only_file_is_empty_table() {
        let table = load("").unwrap();
        assert!(table.is_empty());
    }
}

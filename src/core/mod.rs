//! Core data structures: traffic records, the history table and forecasts.

mod forecast;
mod history;
mod record;
mod time_series;

pub use forecast::{Component, Forecast, ForecastPoint, ForecastTable};
pub use history::HistoryTable;
pub use record::{CalendarFeatures, Metric, TrafficRecord};
pub use time_series::{MissingValuePolicy, TimeSeries};

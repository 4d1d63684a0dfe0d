//! # traffic-forecast
//!
//! Forecasting of organic search traffic from daily Search Console style
//! exports (`Date,Clicks,Impressions,CTR,Position`).
//!
//! A run loads and cleans the history, fits a decomposable trend and
//! seasonality model to the clicks, forecasts a horizon with uncertainty
//! intervals, summarizes the history and writes `predictions.csv` plus
//! PNG charts. Each stage is usable on its own; [`pipeline::run`] chains
//! them.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod adapter;
pub mod analysis;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod export;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod utils;
pub mod visualize;

pub use error::{Result, TrafficError};

pub mod prelude {
    pub use crate::adapter::{FittedAdapter, ForecastAdapter, UnfittedAdapter};
    pub use crate::analysis::{AnalysisSummary, Analyzer};
    pub use crate::config::{Config, Growth, SeasonalityMode};
    pub use crate::core::{ForecastTable, HistoryTable, TimeSeries, TrafficRecord};
    pub use crate::error::{Result, TrafficError};
    pub use crate::loader::Loader;
    pub use crate::models::Forecaster;
    pub use crate::pipeline::{run, RunOptions, RunSummary};
    pub use crate::preprocess::Preprocessor;
    pub use crate::utils::{calculate_metrics, AccuracyMetrics};
}

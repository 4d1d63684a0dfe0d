//! Utility functions for forecasting models.

pub mod cross_validation;
pub mod metrics;
pub mod ols;
pub mod stats;

pub use cross_validation::{cross_validate, CVConfig, CVResults, CVStrategy};
pub use metrics::{calculate_interval_metrics, calculate_metrics, AccuracyMetrics};
pub use ols::{ridge_fit, RidgeResult};

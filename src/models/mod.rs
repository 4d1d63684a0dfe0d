//! Forecasting models.

mod traits;

pub mod additive;

pub use additive::AdditiveModel;
pub use traits::{future_dates, Forecaster};

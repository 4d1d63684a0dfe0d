//! Additive trend/seasonality/holiday model.

mod model;
pub mod seasonality;
pub mod trend;

pub use model::AdditiveModel;
pub use seasonality::{BlockKind, SeasonalBlock};
pub use trend::{PiecewiseTrend, TrendLink};

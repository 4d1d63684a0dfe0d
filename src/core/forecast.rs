//! Forecast results: the raw model output and the dated table built from it.

use crate::error::{Result, TrafficError};
use chrono::NaiveDate;

/// A named additive contribution to the prediction (trend, weekly, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub values: Vec<f64>,
}

/// Model output for a run of dates: point predictions, interval bounds and
/// the components that sum to the point prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
    components: Vec<Component>,
}

impl Forecast {
    /// Create an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a forecast from point predictions.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            point: values,
            ..Self::default()
        }
    }

    /// Create a forecast with prediction intervals.
    pub fn from_values_with_intervals(values: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self {
            point: values,
            lower: Some(lower),
            upper: Some(upper),
            components: Vec::new(),
        }
    }

    /// Attach a named component. Its length must match the horizon.
    pub fn with_component(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.point.len());
        self.components.push(Component {
            name: name.into(),
            values,
        });
        self
    }

    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&[f64]> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Clamp point predictions and bounds from below.
    pub fn clamp_min(&mut self, floor: f64) {
        let clamp = |v: &mut f64| *v = v.max(floor);
        self.point.iter_mut().for_each(clamp);
        if let Some(lower) = self.lower.as_mut() {
            lower.iter_mut().for_each(clamp);
        }
        if let Some(upper) = self.upper.as_mut() {
            upper.iter_mut().for_each(clamp);
        }
    }
}

/// One dated prediction with its interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }
}

/// Dated predictions, one row per day, plus the components behind them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTable {
    rows: Vec<ForecastPoint>,
    components: Vec<Component>,
}

impl ForecastTable {
    /// Attach dates to a model forecast. The forecast must carry intervals.
    pub fn from_forecast(dates: &[NaiveDate], forecast: Forecast) -> Result<Self> {
        if dates.len() != forecast.horizon() {
            return Err(TrafficError::Validation(format!(
                "{} dates for a forecast of {} steps",
                dates.len(),
                forecast.horizon()
            )));
        }
        let (lower, upper) = match (forecast.lower, forecast.upper) {
            (Some(l), Some(u)) => (l, u),
            _ => {
                return Err(TrafficError::Computation(
                    "forecast has no prediction intervals".to_string(),
                ))
            }
        };
        let rows = dates
            .iter()
            .zip(forecast.point.iter().zip(lower.iter().zip(upper.iter())))
            .map(|(&date, (&p, (&l, &u)))| ForecastPoint {
                date,
                point_estimate: p,
                lower_bound: l,
                upper_bound: u,
            })
            .collect();
        Ok(Self {
            rows,
            components: forecast.components,
        })
    }

    /// Build directly from rows (used when reading exported predictions).
    pub fn from_rows(rows: Vec<ForecastPoint>) -> Self {
        Self {
            rows,
            components: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ForecastPoint] {
        &self.rows
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn point_estimates(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.point_estimate).collect()
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.lower_bound).collect()
    }

    pub fn upper_bounds(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.upper_bound).collect()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&[f64]> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn forecast_components_lookup() {
        let forecast = Forecast::from_values(vec![3.0, 4.0])
            .with_component("trend", vec![2.0, 3.0])
            .with_component("weekly", vec![1.0, 1.0]);
        assert_eq!(forecast.horizon(), 2);
        assert!(!forecast.has_intervals());
        assert_eq!(forecast.component("weekly"), Some(&[1.0, 1.0][..]));
        assert_eq!(forecast.component("yearly"), None);
    }

    #[test]
    fn clamp_min_applies_to_bounds() {
        let mut forecast =
            Forecast::from_values_with_intervals(vec![-1.0, 5.0], vec![-3.0, 2.0], vec![1.0, 8.0]);
        forecast.clamp_min(0.0);
        assert_eq!(forecast.point(), &[0.0, 5.0]);
        assert_eq!(forecast.lower().unwrap(), &[0.0, 2.0]);
        assert_eq!(forecast.upper().unwrap(), &[1.0, 8.0]);
    }

    #[test]
    fn table_from_forecast_pairs_dates() {
        let forecast = Forecast::from_values_with_intervals(
            vec![10.0, 11.0, 12.0],
            vec![8.0, 9.0, 10.0],
            vec![12.0, 13.0, 14.0],
        )
        .with_component("trend", vec![10.0, 11.0, 12.0]);
        let table = ForecastTable::from_forecast(&dates(3), forecast).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[2].date, dates(3)[2]);
        assert_eq!(table.point_estimates(), vec![10.0, 11.0, 12.0]);
        assert!(table.rows()[0].contains(9.5));
        assert!(!table.rows()[0].contains(12.5));
        assert!(table.component("trend").is_some());
    }

    #[test]
    fn table_requires_matching_lengths_and_intervals() {
        let forecast = Forecast::from_values_with_intervals(vec![1.0], vec![0.0], vec![2.0]);
        assert!(ForecastTable::from_forecast(&dates(2), forecast).is_err());

        let no_intervals = Forecast::from_values(vec![1.0]);
        assert!(matches!(
            ForecastTable::from_forecast(&dates(1), no_intervals),
            Err(TrafficError::Computation(_))
        ));
    }
}

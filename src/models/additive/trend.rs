//! Piecewise-linear trend with changepoints, and the logistic link.

/// Changepoint locations in scaled time, spread uniformly over the first
/// `range` share of the observations.
///
/// Fewer changepoints are used when the history is too short to hold the
/// requested number.
pub fn place_changepoints(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let hist_size = (t.len() as f64 * range).floor() as usize;
    let n = n_changepoints.min(hist_size.saturating_sub(1));
    if n == 0 {
        return Vec::new();
    }
    let step = (hist_size - 1) as f64 / n as f64;
    (1..=n)
        .map(|i| t[(i as f64 * step).round() as usize])
        .collect()
}

/// Design columns `[1, t, (t - s_1)+, ..., (t - s_k)+]`.
pub fn hinge_columns(t: &[f64], changepoints: &[f64]) -> Vec<Vec<f64>> {
    let mut columns = Vec::with_capacity(changepoints.len() + 2);
    columns.push(vec![1.0; t.len()]);
    columns.push(t.to_vec());
    for &s in changepoints {
        columns.push(t.iter().map(|&ti| (ti - s).max(0.0)).collect());
    }
    columns
}

/// Fitted piecewise-linear trend `g(t) = m + k t + sum(delta_j (t - s_j)+)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseTrend {
    pub intercept: f64,
    pub slope: f64,
    pub changepoints: Vec<f64>,
    pub deltas: Vec<f64>,
}

impl PiecewiseTrend {
    /// Build from coefficients laid out as [`hinge_columns`].
    pub fn from_coefficients(changepoints: Vec<f64>, coefficients: &[f64]) -> Self {
        Self {
            intercept: coefficients[0],
            slope: coefficients[1],
            deltas: coefficients[2..2 + changepoints.len()].to_vec(),
            changepoints,
        }
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.intercept
            + self.slope * t
            + self
                .changepoints
                .iter()
                .zip(&self.deltas)
                .map(|(&s, &d)| d * (t - s).max(0.0))
                .sum::<f64>()
    }

    /// Slope after the last changepoint.
    pub fn final_slope(&self) -> f64 {
        self.slope + self.deltas.iter().sum::<f64>()
    }

    /// Mean absolute changepoint delta, the scale of simulated future changes.
    pub fn mean_abs_delta(&self) -> f64 {
        if self.deltas.is_empty() {
            0.0
        } else {
            self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64
        }
    }
}

/// Map from the linear predictor to the trend level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendLink {
    Identity,
    /// Saturating growth between `floor` and `cap` (scaled units).
    Logistic { floor: f64, cap: f64 },
}

impl TrendLink {
    /// Trend level for a linear predictor value.
    pub fn apply(&self, g: f64) -> f64 {
        match *self {
            TrendLink::Identity => g,
            TrendLink::Logistic { floor, cap } => floor + (cap - floor) / (1.0 + (-g).exp()),
        }
    }

    /// Linear-predictor target for an observation.
    pub fn invert(&self, y: f64) -> f64 {
        match *self {
            TrendLink::Identity => y,
            TrendLink::Logistic { floor, cap } => {
                let p = ((y - floor) / (cap - floor)).clamp(1e-4, 1.0 - 1e-4);
                (p / (1.0 - p)).ln()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_time(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn changepoints_cover_requested_range() {
        let t = unit_time(101);
        let cps = place_changepoints(&t, 25, 0.8);
        assert_eq!(cps.len(), 25);
        assert!(cps.windows(2).all(|w| w[0] < w[1]));
        assert!(cps[0] > 0.0);
        assert!(*cps.last().unwrap() <= 0.8 + 1e-12);
    }

    #[test]
    fn short_history_limits_changepoints() {
        let t = unit_time(5);
        // floor(5 * 0.9) = 4 usable points -> at most 3 changepoints
        assert_eq!(place_changepoints(&t, 25, 0.9).len(), 3);
        assert!(place_changepoints(&unit_time(2), 25, 0.9).is_empty());
        assert!(place_changepoints(&t, 0, 0.9).is_empty());
    }

    #[test]
    fn hinge_columns_layout() {
        let t = vec![0.0, 0.5, 1.0];
        let cols = hinge_columns(&t, &[0.5]);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(cols[1], t);
        assert_eq!(cols[2], vec![0.0, 0.0, 0.5]);
    }

    #[test]
    fn piecewise_trend_bends_at_changepoint() {
        let trend = PiecewiseTrend::from_coefficients(vec![0.5], &[1.0, 2.0, -4.0]);
        assert_relative_eq!(trend.evaluate(0.0), 1.0);
        assert_relative_eq!(trend.evaluate(0.5), 2.0);
        // slope -2 after the changepoint
        assert_relative_eq!(trend.evaluate(1.0), 1.0);
        assert_relative_eq!(trend.final_slope(), -2.0);
        assert_relative_eq!(trend.mean_abs_delta(), 4.0);
    }

    #[test]
    fn logistic_link_round_trips() {
        let link = TrendLink::Logistic {
            floor: 0.0,
            cap: 2.0,
        };
        for y in [0.2, 1.0, 1.7] {
            assert_relative_eq!(link.apply(link.invert(y)), y, epsilon = 1e-9);
        }
        // Saturates inside (floor, cap)
        assert!(link.apply(50.0) <= 2.0);
        assert!(link.apply(-50.0) >= 0.0);
        assert_eq!(TrendLink::Identity.apply(3.5), 3.5);
    }
}

//! Cleaning and enrichment of the loaded history.
//!
//! Missing metrics are filled and calendar features attached; extreme
//! counts can then be winsorized. Processing a processed table returns it
//! unchanged.

use crate::config::{Config, FillPolicy};
use crate::core::{CalendarFeatures, HistoryTable, Metric, MissingValuePolicy};
use crate::detection::{detect_outliers, robust_bounds, OutlierConfig};
use crate::error::{Result, TrafficError};

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    fill_policy: FillPolicy,
    winsorize_sigma: Option<f64>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            fill_policy: config.fill_policy,
            winsorize_sigma: config.winsorize_sigma,
        }
    }

    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = policy;
        self
    }

    pub fn with_winsorize_sigma(mut self, sigma: f64) -> Self {
        self.winsorize_sigma = Some(sigma);
        self
    }

    /// Return a gap-free, feature-enriched copy of `table`.
    pub fn process(&self, table: &HistoryTable) -> Result<HistoryTable> {
        let mut out = table.clone();
        if out.is_empty() {
            out.set_features(Vec::new());
            return Ok(out);
        }

        let policy = match self.fill_policy {
            FillPolicy::ForwardFill => MissingValuePolicy::ForwardFill,
            FillPolicy::Interpolate => MissingValuePolicy::Interpolate,
        };
        for (metric, missing) in table.missing_counts() {
            if missing == 0 {
                continue;
            }
            let filled = table.series(metric).sanitized(policy)?;
            out.set_column(metric, filled.values());
            tracing::info!(column = %metric, missing, policy = %self.fill_policy, "filled missing values");
        }

        let mut features: Vec<CalendarFeatures> =
            out.records().iter().map(CalendarFeatures::derive).collect();

        if let Some(sigma) = self.winsorize_sigma {
            if !(sigma.is_finite() && sigma >= 1.0) {
                return Err(TrafficError::Validation(format!(
                    "winsorize_sigma must be at least 1, got {sigma}"
                )));
            }
            for metric in Metric::ALL.into_iter().filter(Metric::is_count) {
                let clamped = winsorize(out.series(metric).values(), sigma);
                if clamped.changed.is_empty() {
                    continue;
                }
                out.set_column(metric, &clamped.values);
                // ratio features of clamped rows follow the new counts
                for &i in &clamped.changed {
                    features[i] = CalendarFeatures::derive(&out.records()[i]);
                }
                tracing::info!(column = %metric, clamped = clamped.changed.len(), "winsorized extreme values");
            }
        }

        out.set_features(features);
        Ok(out)
    }
}

struct Winsorized {
    values: Vec<f64>,
    /// Indices of the clamped values.
    changed: Vec<usize>,
}

/// Clamp count values to `median +- sigma * 1.4826 * MAD`.
///
/// Bounds are widened to whole numbers so clamped counts stay beyond the
/// unrounded bounds and a second pass sees the same median and MAD.
fn winsorize(values: &[f64], sigma: f64) -> Winsorized {
    let Some((lo, hi)) = robust_bounds(values, sigma) else {
        return Winsorized {
            values: values.to_vec(),
            changed: Vec::new(),
        };
    };
    let (lo, hi) = (lo.floor(), hi.ceil());
    let mut changed = Vec::new();
    let values = values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = v.clamp(lo, hi);
            if c != v {
                changed.push(i);
            }
            c
        })
        .collect();
    Winsorized { values, changed }
}

/// Indices whose clicks lie more than `z` standard deviations from the mean.
pub fn flag_outliers(table: &HistoryTable, z: f64) -> Vec<usize> {
    let clicks = table.clicks();
    detect_outliers(clicks.values(), &OutlierConfig::z_score(z)).outlier_indices
}

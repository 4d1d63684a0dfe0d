//! Outlier detection utilities.
//!
//! Scores each value of a series and flags those above a threshold. Also
//! provides the robust clamping bounds used for winsorization.

use crate::utils::stats::{mad, mean, median, std_dev};

/// Scale factor turning a MAD into a consistent estimate of sigma for
/// normally distributed data.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Method for outlier detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierMethod {
    /// Distance from the mean in sample standard deviations.
    ZScore,
    /// Distance from the median in robust sigmas (1.4826 * MAD).
    Robust,
}

/// Result of outlier detection.
#[derive(Debug, Clone)]
pub struct OutlierResult {
    /// Indices of detected outliers.
    pub outlier_indices: Vec<usize>,
    /// Outlier scores for each point (higher = more anomalous).
    pub scores: Vec<f64>,
    /// Threshold used for detection.
    pub threshold: f64,
    /// Method used.
    pub method: OutlierMethod,
}

impl OutlierResult {
    /// Get the number of outliers detected.
    pub fn outlier_count(&self) -> usize {
        self.outlier_indices.len()
    }

    /// Check if a specific index is an outlier.
    pub fn is_outlier(&self, index: usize) -> bool {
        self.outlier_indices.binary_search(&index).is_ok()
    }
}

/// Configuration for outlier detection.
#[derive(Debug, Clone)]
pub struct OutlierConfig {
    /// Detection method.
    pub method: OutlierMethod,
    /// Scores strictly above this are outliers.
    pub threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self::z_score(3.0)
    }
}

impl OutlierConfig {
    /// Use Z-score method with specified threshold (default 3.0).
    pub fn z_score(threshold: f64) -> Self {
        Self {
            method: OutlierMethod::ZScore,
            threshold,
        }
    }

    /// Use the MAD-based robust score with specified threshold.
    pub fn robust(threshold: f64) -> Self {
        Self {
            method: OutlierMethod::Robust,
            threshold,
        }
    }
}

/// Detect outliers in a series. Non-finite values score zero.
pub fn detect_outliers(series: &[f64], config: &OutlierConfig) -> OutlierResult {
    let scores = match config.method {
        OutlierMethod::ZScore => z_scores(series),
        OutlierMethod::Robust => robust_scores(series),
    };

    let outlier_indices = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score > config.threshold)
        .map(|(i, _)| i)
        .collect();

    OutlierResult {
        outlier_indices,
        scores,
        threshold: config.threshold,
        method: config.method,
    }
}

/// Absolute z-scores; all zero when the series is constant or too short.
pub fn z_scores(series: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return vec![0.0; series.len()];
    }
    let m = mean(&finite);
    let sd = std_dev(&finite);
    if sd < 1e-10 {
        return vec![0.0; series.len()];
    }
    series
        .iter()
        .map(|x| if x.is_finite() { ((x - m) / sd).abs() } else { 0.0 })
        .collect()
}

fn robust_scores(series: &[f64]) -> Vec<f64> {
    match robust_center_scale(series) {
        Some((center, scale)) => series
            .iter()
            .map(|x| if x.is_finite() { ((x - center) / scale).abs() } else { 0.0 })
            .collect(),
        None => vec![0.0; series.len()],
    }
}

/// Median and robust sigma of the finite values, or `None` when the MAD is zero.
pub fn robust_center_scale(series: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let scale = MAD_TO_SIGMA * mad(&finite);
    if scale < 1e-10 {
        return None;
    }
    Some((median(&finite), scale))
}

/// Clamping bounds `median +- k * sigma` for winsorization.
pub fn robust_bounds(series: &[f64], k: f64) -> Option<(f64, f64)> {
    robust_center_scale(series).map(|(center, scale)| (center - k * scale, center + k * scale))
}

//! Outlier detection for traffic series.

mod outlier;

pub use outlier::{
    detect_outliers, robust_bounds, robust_center_scale, z_scores, OutlierConfig, OutlierMethod,
    OutlierResult, MAD_TO_SIGMA,
};

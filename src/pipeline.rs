//! End-to-end run: load, preprocess, fit, predict, analyze, render, export.

use crate::adapter::{UnfittedAdapter, ValidationReport};
use crate::analysis::Analyzer;
use crate::config::Config;
use crate::error::{Result, TrafficError};
use crate::export::write_predictions;
use crate::loader::Loader;
use crate::preprocess::{flag_outliers, Preprocessor};
use crate::utils::stats::mean;
use crate::visualize::Visualizer;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// Steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Preprocess,
    Fit,
    Predict,
    Analyze,
    Render,
    Export,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Load,
        Stage::Preprocess,
        Stage::Fit,
        Stage::Predict,
        Stage::Analyze,
        Stage::Render,
        Stage::Export,
    ];

    /// Name of the pipeline state reached once this stage succeeds.
    pub fn reached_state(&self) -> &'static str {
        match self {
            Stage::Load => "Loaded",
            Stage::Preprocess => "Preprocessed",
            Stage::Fit => "Fitted",
            Stage::Predict => "Predicted",
            Stage::Analyze => "Analyzed",
            Stage::Render => "Rendered",
            Stage::Export => "Exported",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Preprocess => "preprocess",
            Stage::Fit => "fit",
            Stage::Predict => "predict",
            Stage::Analyze => "analyze",
            Stage::Render => "render",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// A stage failure; the run stops at the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub source: TrafficError,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Overrides `config.horizon_days` when set.
    pub horizon_days: Option<i64>,
    pub config: Config,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            horizon_days: None,
            config: Config::default(),
        }
    }

    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon_days = Some(days);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The run configuration with the horizon override applied and validated.
    pub fn resolved_config(&self) -> Result<Config> {
        let config = match self.horizon_days {
            Some(days) if days <= 0 => {
                return Err(TrafficError::Validation(format!(
                    "horizon must be a positive number of days, got {days}"
                )))
            }
            Some(days) => self.config.clone().with_horizon_days(days as usize),
            None => self.config.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub mean_daily_clicks: f64,
    pub horizon_days: usize,
    pub mean_predicted_clicks: Option<f64>,
    pub week_over_week_pct: Option<f64>,
    pub anomalies: usize,
    pub validation: Option<ValidationReport>,
    pub written: Vec<PathBuf>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Historical data: {} days", self.rows)?;
        writeln!(f, "Date range: {} to {}", self.first_date, self.last_date)?;
        writeln!(f, "Average daily clicks: {:.0}", self.mean_daily_clicks)?;
        if let Some(predicted) = self.mean_predicted_clicks {
            writeln!(
                f,
                "Predicted average (next {} days): {:.0}",
                self.horizon_days, predicted
            )?;
        }
        if let Some(wow) = self.week_over_week_pct {
            writeln!(f, "Week over week: {wow:+.1}%")?;
        }
        writeln!(f, "Anomalous days: {}", self.anomalies)?;
        if let Some(report) = &self.validation {
            match report.metrics.mape {
                Some(mape) => writeln!(
                    f,
                    "Holdout ({} days): MAE {:.1}, MAPE {:.1}%",
                    report.test_size, report.metrics.mae, mape
                )?,
                None => writeln!(f, "Holdout ({} days): MAE {:.1}", report.test_size, report.metrics.mae)?,
            }
        }
        for path in &self.written {
            writeln!(f, "Wrote {}", path.display())?;
        }
        Ok(())
    }
}

fn stage<T>(stage: Stage, step: impl FnOnce() -> Result<T>) -> std::result::Result<T, PipelineError> {
    tracing::debug!(%stage, "stage started");
    let value = step().map_err(|source| {
        tracing::error!(%stage, error = %source, "stage failed");
        PipelineError { stage, source }
    })?;
    tracing::info!(%stage, state = stage.reached_state(), "stage finished");
    Ok(value)
}

/// Execute every stage in order, stopping at the first failure.
pub fn run(options: &RunOptions) -> std::result::Result<RunSummary, PipelineError> {
    let out = &options.output_dir;

    let (config, history) = stage(Stage::Load, || {
        let config = options.resolved_config()?;
        let history = Loader::from_config(&config).load(&options.input)?;
        Ok((config, history))
    })?;
    let config = &config;
    let history = stage(Stage::Preprocess, || {
        let processed = Preprocessor::from_config(config).process(&history)?;
        let spikes = flag_outliers(&processed, config.anomaly_sigma);
        if !spikes.is_empty() {
            tracing::warn!(count = spikes.len(), "click values beyond the z-score threshold");
        }
        Ok(processed)
    })?;
    let fitted = stage(Stage::Fit, || UnfittedAdapter::new(config.clone()).fit(&history))?;
    let horizon = config.horizon_days as i64;
    let forecast = stage(Stage::Predict, || fitted.predict(horizon))?;
    let summary = stage(Stage::Analyze, || {
        Analyzer::from_config(config).analyze(&history, fitted.fitted(), &forecast)
    })?;

    let mut written = stage(Stage::Render, || {
        if config.export_charts {
            Visualizer::from_config(out, config).render(&history, fitted.fitted(), &forecast, &summary)
        } else {
            tracing::info!("chart export disabled");
            Ok(Vec::new())
        }
    })?;
    let predictions = stage(Stage::Export, || {
        std::fs::create_dir_all(out).map_err(|e| TrafficError::io(out, e))?;
        let path = out.join(PREDICTIONS_FILE);
        write_predictions(&path, &forecast)?;
        Ok(path)
    })?;
    written.push(predictions);

    let clicks = history.clicks();
    let (first_date, last_date) = match (clicks.first_date(), clicks.last_date()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(PipelineError {
                stage: Stage::Load,
                source: TrafficError::InsufficientData { needed: 1, got: 0 },
            })
        }
    };

    Ok(RunSummary {
        rows: history.len(),
        first_date,
        last_date,
        mean_daily_clicks: mean(clicks.values()),
        horizon_days: forecast.len(),
        mean_predicted_clicks: summary.forecast_mean,
        week_over_week_pct: summary.week_over_week_pct,
        anomalies: summary.anomalies.len(),
        validation: fitted.validation().cloned(),
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_csv(dir: &std::path::Path, days: usize) -> PathBuf {
        let path = dir.join("traffic.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Date,Clicks,Impressions,CTR,Position").unwrap();
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        for i in 0..days {
            let date = start + chrono::Duration::days(i as i64);
            let clicks = 200 + (i % 7) * 10 + i / 10;
            writeln!(file, "{date},{clicks},{},{:.2}%,{:.1}", clicks * 20, 5.0, 7.5).unwrap();
        }
        path
    }

    fn quiet_config() -> Config {
        Config::default()
            .with_charts(false)
            .with_uncertainty_samples(200)
    }

    #[test]
    fn stage_names_and_states() {
        assert_eq!(Stage::Load.to_string(), "load");
        assert_eq!(Stage::Export.reached_state(), "Exported");
        assert_eq!(Stage::ALL.len(), 7);
    }

    #[test]
    fn run_writes_predictions() {
        let dir = tempdir().unwrap();
        let input = write_csv(dir.path(), 120);
        let out = dir.path().join("out");
        let options = RunOptions::new(&input, &out)
            .with_horizon_days(14)
            .with_config(quiet_config());

        let summary = run(&options).unwrap();
        assert_eq!(summary.rows, 120);
        assert_eq!(summary.horizon_days, 14);
        assert_eq!(summary.written, vec![out.join(PREDICTIONS_FILE)]);
        assert!(summary.mean_predicted_clicks.unwrap() > 150.0);
        assert!(summary.validation.is_some());
        assert!(summary.to_string().contains("Historical data: 120 days"));

        let text = std::fs::read_to_string(out.join(PREDICTIONS_FILE)).unwrap();
        assert_eq!(text.lines().count(), 15);
    }

    #[test]
    fn run_writes_png_and_svg_charts() {
        let dir = tempdir().unwrap();
        let input = write_csv(dir.path(), 90);
        let out = dir.path().join("charts");
        let config = Config::default()
            .with_uncertainty_samples(100)
            .with_svg(true);
        let options = RunOptions::new(&input, &out)
            .with_horizon_days(7)
            .with_config(config);

        let summary = run(&options).unwrap();
        assert_eq!(summary.written.len(), 7);
        for name in ["forecast", "components", "analysis"] {
            for ext in ["png", "svg"] {
                let path = out.join(format!("{name}.{ext}"));
                assert!(summary.written.contains(&path));
                assert!(std::fs::metadata(&path).unwrap().len() > 0);
            }
        }
        let svg = std::fs::read_to_string(out.join("forecast.svg")).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn failure_names_the_stage() {
        let dir = tempdir().unwrap();
        let options = RunOptions::new(dir.path().join("absent.csv"), dir.path().join("out"))
            .with_config(quiet_config());
        let err = run(&options).unwrap_err();
        assert_eq!(err.stage, Stage::Load);
        assert!(matches!(err.source, TrafficError::Io { .. }));
        assert!(err.to_string().starts_with("load stage failed: "));

        let input = write_csv(dir.path(), 1);
        let options = RunOptions::new(&input, dir.path().join("out")).with_config(quiet_config());
        let err = run(&options).unwrap_err();
        assert_eq!(err.stage, Stage::Fit);
        assert_eq!(err.source, TrafficError::InsufficientData { needed: 2, got: 1 });
        assert!(!dir.path().join("out").join(PREDICTIONS_FILE).exists());
    }

    #[test]
    fn non_positive_horizon_fails_before_loading() {
        let dir = tempdir().unwrap();
        let input = write_csv(dir.path(), 30);
        let out = dir.path().join("out");
        for days in [0, -3] {
            let options = RunOptions::new(&input, &out)
                .with_horizon_days(days)
                .with_config(quiet_config());
            let err = run(&options).unwrap_err();
            assert_eq!(err.stage, Stage::Load);
            assert!(matches!(err.source, TrafficError::Validation(_)));
            assert!(!out.exists());
        }
        assert!(RunOptions::new(&input, &out)
            .with_horizon_days(7)
            .resolved_config()
            .is_ok_and(|c| c.horizon_days == 7));
    }
}

//! Static charts of the history, the forecast and the analysis, as PNG and
//! optionally SVG.

use crate::analysis::{AnalysisSummary, GroupMean};
use crate::config::Config;
use crate::core::{ForecastPoint, ForecastTable, HistoryTable};
use crate::error::{Result, TrafficError};
use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

pub const FORECAST_CHART: &str = "forecast";
pub const COMPONENTS_CHART: &str = "components";
pub const ANALYSIS_CHART: &str = "analysis";

const ROLLING_WINDOW: usize = 7;
const HISTOGRAM_BINS: usize = 30;

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Image format of a chart file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFormat {
    Png,
    Svg,
}

impl ChartFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ChartFormat::Png => "png",
            ChartFormat::Svg => "svg",
        }
    }

    /// `stem` with this format's extension, e.g. `forecast.svg`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension())
    }
}

/// Draws one chart through the backend matching each requested format.
macro_rules! draw_each {
    ($vis:expr, $stem:expr, $size:expr, $draw:ident($($arg:expr),*)) => {{
        let mut written = Vec::new();
        for format in &$vis.formats {
            let path = $vis.output_dir.join(format.file_name($stem));
            let drawn = match format {
                ChartFormat::Png => {
                    $draw(BitMapBackend::new(&path, $size).into_drawing_area(), $($arg),*)
                }
                ChartFormat::Svg => {
                    $draw(SVGBackend::new(&path, $size).into_drawing_area(), $($arg),*)
                }
            };
            drawn.map_err(|e| TrafficError::io(&path, e))?;
            written.push(path);
        }
        written
    }};
}

/// Writes the forecast, components and analysis charts into one directory.
#[derive(Debug, Clone)]
pub struct Visualizer {
    output_dir: PathBuf,
    width: u32,
    height: u32,
    formats: Vec<ChartFormat>,
}

impl Visualizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            width: 1000,
            height: 600,
            formats: vec![ChartFormat::Png],
        }
    }

    pub fn from_config(output_dir: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(output_dir)
            .with_size(config.chart_width, config.chart_height)
            .with_svg(config.export_svg)
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Add or remove SVG output; PNG is always written.
    pub fn with_svg(mut self, enabled: bool) -> Self {
        self.formats.retain(|f| *f == ChartFormat::Png);
        if enabled {
            self.formats.push(ChartFormat::Svg);
        }
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn formats(&self) -> &[ChartFormat] {
        &self.formats
    }

    /// Render every chart in every format, returning the written paths.
    pub fn render(
        &self,
        history: &HistoryTable,
        fitted: &ForecastTable,
        forecast: &ForecastTable,
        summary: &AnalysisSummary,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| TrafficError::io(&self.output_dir, e))?;
        let mut written = self.plot_forecast(history, fitted, forecast)?;
        written.extend(self.plot_components(fitted, forecast)?);
        written.extend(self.plot_analysis(history, summary)?);
        tracing::info!(dir = %self.output_dir.display(), charts = written.len(), "charts rendered");
        Ok(written)
    }

    /// History, in-sample fit, forecast and its interval band.
    pub fn plot_forecast(
        &self,
        history: &HistoryTable,
        fitted: &ForecastTable,
        forecast: &ForecastTable,
    ) -> Result<Vec<PathBuf>> {
        let size = (self.width, self.height);
        Ok(draw_each!(self, FORECAST_CHART, size, draw_forecast(history, fitted, forecast)))
    }

    /// One panel per model component across history and forecast dates.
    pub fn plot_components(
        &self,
        fitted: &ForecastTable,
        forecast: &ForecastTable,
    ) -> Result<Vec<PathBuf>> {
        let height = self.height.max(200 * fitted.components().len().max(1) as u32);
        let size = (self.width, height);
        Ok(draw_each!(self, COMPONENTS_CHART, size, draw_components(fitted, forecast)))
    }

    /// Weekday pattern, monthly pattern, rolling clicks and distribution.
    pub fn plot_analysis(
        &self,
        history: &HistoryTable,
        summary: &AnalysisSummary,
    ) -> Result<Vec<PathBuf>> {
        let size = (self.width * 6 / 5, self.height * 13 / 10);
        Ok(draw_each!(self, ANALYSIS_CHART, size, draw_analysis(history, summary)))
    }
}

/// Trailing mean over up to `window` values ending at each index.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut sum = 0.0_f64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            sum += *v;
            if i >= window {
                sum -= values[i - window];
            }
            sum / (i + 1).min(window) as f64
        })
        .collect()
}

/// Finite min and max of `values` padded by 5%; `(0, 1)` when there are none.
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    (lo - pad, hi + pad)
}

/// Equal-width bins as `(left edge, right edge, count)`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };
    let mut counts = vec![0usize; bins];
    for v in values {
        let bin = ((v - lo) / width).floor() as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
        .collect()
}

fn day_offset(origin: NaiveDate, date: NaiveDate) -> f64 {
    (date - origin).num_days() as f64
}

fn date_label(origin: NaiveDate, x: f64) -> String {
    (origin + Duration::days(x.round() as i64))
        .format("%Y-%m-%d")
        .to_string()
}

fn draw_forecast<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    history: &HistoryTable,
    fitted: &ForecastTable,
    forecast: &ForecastTable,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let clicks = history.clicks();
    let Some(origin) = clicks.first_date().or_else(|| forecast.dates().first().copied()) else {
        return Err("nothing to plot".into());
    };
    let actual: Vec<(f64, f64)> = clicks
        .dates()
        .iter()
        .zip(clicks.values())
        .map(|(d, v)| (day_offset(origin, *d), *v))
        .collect();
    let xy = |table: &ForecastTable, pick: fn(&ForecastPoint) -> f64| -> Vec<(f64, f64)> {
        table
            .rows()
            .iter()
            .map(|r| (day_offset(origin, r.date), pick(r)))
            .collect()
    };
    let fit_line = xy(fitted, |r| r.point_estimate);
    let forecast_line = xy(forecast, |r| r.point_estimate);
    let mut band = xy(forecast, |r| r.upper_bound);
    band.extend(xy(forecast, |r| r.lower_bound).into_iter().rev());

    let (x0, x1) = padded_range(actual.iter().chain(&forecast_line).map(|p| p.0));
    let (y0, y1) = padded_range(actual.iter().chain(&fit_line).chain(&band).map(|p| p.1));

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Organic clicks forecast", ("sans-serif", 28).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Clicks")
        .x_label_formatter(&|x| date_label(origin, *x))
        .draw()?;

    if !band.is_empty() {
        chart
            .draw_series(std::iter::once(Polygon::new(band, BLUE.mix(0.2).filled())))?
            .label("Interval")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.2).filled()));
    }
    chart
        .draw_series(actual.iter().map(|&p| Circle::new(p, 2, BLACK.mix(0.6).filled())))?
        .label("Actual")
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
    chart
        .draw_series(LineSeries::new(fit_line, GREEN))?
        .label("Fitted")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN));
    chart
        .draw_series(LineSeries::new(forecast_line, BLUE.stroke_width(2)))?
        .label("Forecast")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_components<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    fitted: &ForecastTable,
    forecast: &ForecastTable,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let dates: Vec<NaiveDate> = fitted.dates().into_iter().chain(forecast.dates()).collect();
    let Some(&origin) = dates.first() else {
        return Err("nothing to plot".into());
    };
    let xs: Vec<f64> = dates.iter().map(|d| day_offset(origin, *d)).collect();
    let (x0, x1) = padded_range(xs.iter().copied());

    root.fill(&WHITE)?;
    let components = fitted.components();
    let panels = root.split_evenly((components.len().max(1), 1));

    for (area, component) in panels.iter().zip(components) {
        let mut values = component.values.clone();
        values.extend(forecast.component(&component.name).unwrap_or_default());
        let (y0, y1) = padded_range(values.iter().copied());

        let mut chart = ChartBuilder::on(area)
            .caption(&component.name, ("sans-serif", 20).into_font())
            .margin(8)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_label_formatter(&|x| date_label(origin, *x))
            .draw()?;
        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(values.iter().copied()),
            BLUE,
        ))?;
    }
    root.present()?;
    Ok(())
}

fn draw_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    groups: &[GroupMean],
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let (_, y1) = padded_range(groups.iter().map(|g| g.average_clicks).chain([0.0]));
    let labels: Vec<&str> = groups.iter().map(|g| g.label).collect();
    let n = groups.len().max(1);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(8)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), 0.0..y1)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| {
            let i = x.round();
            if i >= 0.0 && (i as usize) < labels.len() {
                labels[i as usize].to_string()
            } else {
                String::new()
            }
        })
        .y_desc("Average clicks")
        .draw()?;
    chart.draw_series(groups.iter().enumerate().map(|(i, g)| {
        let x = i as f64;
        let color = if g.relative_strength >= 0.0 { GREEN } else { RED };
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, g.average_clicks)], color.mix(0.7).filled())
    }))?;
    Ok(())
}

fn draw_analysis<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    history: &HistoryTable,
    summary: &AnalysisSummary,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let clicks = history.clicks();
    let Some(origin) = clicks.first_date() else {
        return Err("nothing to plot".into());
    };
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 2));

    draw_bars(&panels[0], "Weekly pattern", &summary.weekly_pattern)?;
    draw_bars(&panels[1], "Monthly pattern", &summary.monthly_pattern)?;

    let xs: Vec<f64> = clicks.dates().iter().map(|d| day_offset(origin, *d)).collect();
    let smooth = rolling_mean(clicks.values(), ROLLING_WINDOW);
    let (x0, x1) = padded_range(xs.iter().copied());
    let (y0, y1) = padded_range(clicks.values().iter().copied());
    let mut trend = ChartBuilder::on(&panels[2])
        .caption("Clicks with 7-day mean", ("sans-serif", 20).into_font())
        .margin(8)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    trend
        .configure_mesh()
        .x_labels(5)
        .x_label_formatter(&|x| date_label(origin, *x))
        .draw()?;
    trend.draw_series(LineSeries::new(
        xs.iter().copied().zip(clicks.values().iter().copied()),
        BLUE.mix(0.3),
    ))?;
    trend.draw_series(LineSeries::new(
        xs.iter().copied().zip(smooth),
        RED.stroke_width(2),
    ))?;

    let bins = histogram(clicks.values(), HISTOGRAM_BINS);
    let (h0, h1) = padded_range(bins.iter().flat_map(|b| [b.0, b.1]));
    let max_count = bins.iter().map(|b| b.2).max().unwrap_or(1) as f64;
    let mut dist = ChartBuilder::on(&panels[3])
        .caption("Click distribution", ("sans-serif", 20).into_font())
        .margin(8)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(h0..h1, 0.0..max_count * 1.1)?;
    dist.configure_mesh().x_desc("Daily clicks").y_desc("Days").draw()?;
    dist.draw_series(bins.iter().map(|&(left, right, count)| {
        Rectangle::new([(left, 0.0), (right, count as f64)], BLUE.mix(0.6).filled())
    }))?;

    root.present()?;
    Ok(())
}

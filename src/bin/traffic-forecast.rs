//! Command-line entry point for the organic traffic forecasting pipeline.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use traffic_forecast::config::{Config, FillPolicy, Growth, SeasonalityMode};
use traffic_forecast::pipeline::{self, RunOptions};
use traffic_forecast::TrafficError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "traffic-forecast")]
#[command(about = "Forecast organic search clicks from a daily CSV export", long_about = None)]
struct Cli {
    /// Log model internals (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, model and forecast a traffic CSV, writing predictions and charts
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// CSV with columns Date,Clicks,Impressions,CTR,Position
    input: PathBuf,

    /// Output directory (created if missing)
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Days to forecast [default: horizon_days from the config, 90]
    #[arg(short, long, allow_negative_numbers = true)]
    days: Option<i64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trend growth (linear, logistic)
    #[arg(long)]
    growth: Option<Growth>,

    /// Flexibility of the trend at changepoints
    #[arg(long)]
    changepoint_prior_scale: Option<f64>,

    /// How seasonality combines with the trend (additive, multiplicative)
    #[arg(long)]
    seasonality_mode: Option<SeasonalityMode>,

    /// Lower bound applied to predictions
    #[arg(long, allow_negative_numbers = true)]
    floor: Option<f64>,

    /// Clamp clicks and impressions to median +- k robust deviations
    #[arg(long)]
    winsorize_sigma: Option<f64>,

    /// Missing value strategy (forward_fill, interpolate)
    #[arg(long)]
    fill: Option<FillPolicy>,

    /// Skip chart rendering
    #[arg(long)]
    no_charts: bool,

    /// Also write each chart as SVG
    #[arg(long)]
    svg: bool,
}

impl RunArgs {
    fn config(&self) -> traffic_forecast::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(days) = self.days {
            if days <= 0 {
                return Err(TrafficError::Validation(format!(
                    "--days must be a positive number of days, got {days}"
                )));
            }
            config = config.with_horizon_days(days as usize);
        }
        if let Some(growth) = self.growth {
            config = config.with_growth(growth);
        }
        if let Some(scale) = self.changepoint_prior_scale {
            config = config.with_changepoint_prior_scale(scale);
        }
        if let Some(mode) = self.seasonality_mode {
            config = config.with_seasonality_mode(mode);
        }
        if let Some(floor) = self.floor {
            config = config.with_floor(floor);
        }
        if let Some(sigma) = self.winsorize_sigma {
            config = config.with_winsorize_sigma(sigma);
        }
        if let Some(fill) = self.fill {
            config = config.with_fill_policy(fill);
        }
        if self.no_charts {
            config = config.with_charts(false);
        }
        if self.svg {
            config = config.with_svg(true);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("traffic_forecast=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "traffic_forecast=info".into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let config = match args.config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let options = RunOptions::new(&args.input, &args.output).with_config(config);

            match pipeline::run(&options) {
                Ok(summary) => {
                    println!("{summary}");
                    println!("Results saved to {}", args.output.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

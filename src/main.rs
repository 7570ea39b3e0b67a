use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::error;
use stock_dashboard::{Dashboard, DashboardConfig, MetricsError, Period};

/// Price history, return statistics and a buy-and-hold simulation for one
/// ticker, printed as JSON.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Ticker symbol, e.g. AAPL
    ticker: Option<String>,

    /// History window: 1mo, 3mo, 6mo or 1y
    #[arg(short, long)]
    period: Option<Period>,

    /// Amount invested at the first close
    #[arg(long)]
    principal: Option<f64>,

    /// Moving average window in bars
    #[arg(long)]
    ma_window: Option<usize>,

    /// Seconds a fetched series stays fresh
    #[arg(long)]
    ttl_seconds: Option<u64>,

    /// Directory holding <TICKER>.csv files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON file with default selections
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> eyre::Result<DashboardConfig> {
        let mut config = match &self.config {
            Some(path) => DashboardConfig::from_file(path)?,
            None => DashboardConfig::default(),
        };

        if let Some(ticker) = self.ticker {
            config = config.with_ticker(ticker);
        }
        if let Some(period) = self.period {
            config = config.with_period(period);
        }
        if let Some(principal) = self.principal {
            config = config.with_principal(principal);
        }
        if let Some(ma_window) = self.ma_window {
            config = config.with_ma_window(ma_window);
        }
        if let Some(ttl_seconds) = self.ttl_seconds {
            config = config.with_ttl_seconds(ttl_seconds);
        }
        if let Some(data_dir) = self.data_dir {
            config = config.with_data_dir(data_dir);
        }

        Ok(config)
    }
}

fn hint(err: &eyre::Report) -> Option<&'static str> {
    match err.downcast_ref::<MetricsError>()? {
        MetricsError::EmptySeries => Some("try one of AAPL, MSFT, GOOGL, TSLA, AMZN"),
        MetricsError::InsufficientData { .. } => Some("try a different time period"),
        _ => None,
    }
}

fn run() -> eyre::Result<()> {
    let config = Args::parse().into_config()?;
    let report = Dashboard::from_config(&config).run(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match hint(&err) {
                Some(hint) => error!("{err:#} ({hint})"),
                None => error!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

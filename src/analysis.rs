use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use eyre::WrapErr;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    loader::{CachedProvider, CsvProvider, MarketDataProvider, ProviderConfig, DEFAULT_TTL_SECONDS},
    metrics::{self, DerivedMetrics, MetricsConfig, DEFAULT_MA_WINDOW, DEFAULT_PRINCIPAL},
    model::{Period, Ticker},
};

/// Selections for one dashboard run. Every field has a default, so a config
/// file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub ticker: String,
    pub period: Period,
    pub principal: f64,
    pub ma_window: usize,
    pub ttl_seconds: u64,
    pub data_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            ticker: "AAPL".to_owned(),
            period: Period::default(),
            principal: DEFAULT_PRINCIPAL,
            ma_window: DEFAULT_MA_WINDOW,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl DashboardConfig {
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))
    }

    pub fn with_ticker(mut self, value: impl Into<String>) -> Self {
        self.ticker = value.into();
        self
    }

    pub fn with_period(mut self, value: Period) -> Self {
        self.period = value;
        self
    }

    pub fn with_principal(mut self, value: f64) -> Self {
        self.principal = value;
        self
    }

    pub fn with_ma_window(mut self, value: usize) -> Self {
        self.ma_window = value;
        self
    }

    pub fn with_ttl_seconds(mut self, value: u64) -> Self {
        self.ttl_seconds = value;
        self
    }

    pub fn with_data_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.data_dir = value.into();
        self
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig::default()
            .with_principal(self.principal)
            .with_ma_window(self.ma_window)
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::default().with_ttl_seconds(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub ticker: Ticker,
    pub period: Period,
    pub metrics: DerivedMetrics,
}

/// Fetch, validate and compute, one request at a time.
pub struct Dashboard<P> {
    provider: CachedProvider<P>,
}

impl Dashboard<CsvProvider> {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(
            CsvProvider::new(config.data_dir.clone()),
            config.provider_config(),
        )
    }
}

impl<P: MarketDataProvider> Dashboard<P> {
    pub fn new(provider: P, config: ProviderConfig) -> Self {
        Self {
            provider: CachedProvider::new(provider, config),
        }
    }

    pub fn provider(&self) -> &P {
        self.provider.inner()
    }

    /// Engine failures stay reachable through
    /// `report.downcast_ref::<MetricsError>()`.
    pub fn run(&self, config: &DashboardConfig) -> eyre::Result<DashboardReport> {
        let ticker = Ticker::new(&config.ticker)?;
        let period = config.period;

        // A failed fetch is reported the same way as an unknown ticker.
        let bars = self.provider.fetch(&ticker, period).unwrap_or_else(|err| {
            warn!("could not load data for {ticker} ({period}): {err:#}");
            Vec::new()
        });

        let series = metrics::validate(bars)
            .wrap_err_with(|| format!("cannot analyze {ticker} ({period})"))?;
        let metrics = metrics::compute(&series, &config.metrics_config())
            .wrap_err_with(|| format!("cannot compute metrics for {ticker} ({period})"))?;

        info!(
            "{ticker} ({period}): {} bars, latest close {:.2}, total return {:.2}%",
            series.len(),
            metrics.latest.current,
            metrics.summary.total_return_pct
        );

        Ok(DashboardReport {
            ticker,
            period,
            metrics,
        })
    }
}

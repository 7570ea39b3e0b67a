use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    ops::Bound,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use eyre::{eyre, WrapErr};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::model::{Bar, Period, Ticker};

pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Source of daily bars for one ticker over one period.
///
/// Implementations return bars in ascending date order. An unknown ticker may
/// be reported either as an error or as an empty batch.
pub trait MarketDataProvider {
    fn fetch(&self, ticker: &Ticker, period: Period) -> eyre::Result<Vec<Bar>>;
}

/// Reads `<data_dir>/<TICKER>.csv` exports with `Date`, `Close` and `Volume`
/// columns.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    data_dir: PathBuf,
}

impl CsvProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path_for(&self, ticker: &Ticker) -> PathBuf {
        self.data_dir.join(format!("{ticker}.csv"))
    }
}

impl MarketDataProvider for CsvProvider {
    fn fetch(&self, ticker: &Ticker, period: Period) -> eyre::Result<Vec<Bar>> {
        let path = self.path_for(ticker);
        let trades = load_bars(&path)
            .wrap_err_with(|| format!("failed to load {ticker} from {}", path.display()))?;

        let bars = within_period(trades, period);
        info!("loaded {} bars for {ticker} ({period})", bars.len());
        Ok(bars)
    }
}

/// Fixed bars per ticker, cut to the requested period on every fetch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<Ticker, BTreeMap<NaiveDateTime, Bar>>,
}

impl InMemoryProvider {
    pub fn with_series(mut self, ticker: Ticker, bars: impl IntoIterator<Item = Bar>) -> Self {
        self.series
            .insert(ticker, bars.into_iter().map(|b| (b.date, b)).collect());
        self
    }
}

impl MarketDataProvider for InMemoryProvider {
    fn fetch(&self, ticker: &Ticker, period: Period) -> eyre::Result<Vec<Bar>> {
        Ok(self
            .series
            .get(ticker)
            .map(|trades| within_period(trades.clone(), period))
            .unwrap_or_default())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub ttl_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl ProviderConfig {
    pub fn with_ttl_seconds(mut self, value: u64) -> Self {
        self.ttl_seconds = value;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

struct CacheEntry {
    fetched_at: Instant,
    bars: Vec<Bar>,
}

/// Reuses successful fetches per (ticker, period) while they are younger than
/// the configured TTL. Failures are never cached.
pub struct CachedProvider<P> {
    inner: P,
    ttl: Duration,
    entries: RefCell<HashMap<(Ticker, Period), CacheEntry>>,
}

impl<P: MarketDataProvider> CachedProvider<P> {
    pub fn new(inner: P, config: ProviderConfig) -> Self {
        Self {
            inner,
            ttl: config.ttl(),
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl<P: MarketDataProvider> MarketDataProvider for CachedProvider<P> {
    fn fetch(&self, ticker: &Ticker, period: Period) -> eyre::Result<Vec<Bar>> {
        let key = (ticker.clone(), period);

        if let Some(entry) = self.entries.borrow().get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!("cache hit for {ticker} ({period})");
                return Ok(entry.bars.clone());
            }
        }

        debug!("cache miss for {ticker} ({period})");
        let bars = self.inner.fetch(ticker, period)?;
        self.entries.borrow_mut().insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                bars: bars.clone(),
            },
        );

        Ok(bars)
    }
}

fn within_period(trades: BTreeMap<NaiveDateTime, Bar>, period: Period) -> Vec<Bar> {
    let Some(last) = trades.keys().next_back().copied() else {
        return Vec::new();
    };

    match period.cutoff(last) {
        Some(cutoff) => trades
            .range((Bound::Excluded(cutoff), Bound::Unbounded))
            .map(|(_, b)| *b)
            .collect(),
        None => trades.into_values().collect(),
    }
}

struct Columns {
    date: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn from_header(header: &str) -> eyre::Result<Self> {
        let names = header.split(',').map(|s| s.trim()).collect_vec();
        let position = |name: &str| {
            names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| eyre!("missing {name} column in header {header:?}"))
        };

        Ok(Self {
            date: position("Date")?,
            close: position("Close")?,
            volume: position("Volume")?,
        })
    }
}

fn load_bars(path: impl AsRef<Path>) -> eyre::Result<BTreeMap<NaiveDateTime, Bar>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut trades = BTreeMap::new();

    let Some(header) = lines.next() else {
        return Ok(trades);
    };
    let columns = Columns::from_header(&header?)?;

    for (ix, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let splits = line.split(',').map(|s| s.trim()).collect_vec();
        let field = |position: usize| splits.get(position).copied().unwrap_or_default();

        // Non-trading rows come through with an empty close.
        if field(columns.close).is_empty() {
            continue;
        }

        let row = ix + 2;
        let volume = field(columns.volume)
            .parse::<f64>()
            .wrap_err_with(|| format!("row {row}: bad volume"))?;
        if !volume.is_finite() || volume < 0.0 {
            return Err(eyre!("row {row}: bad volume {volume}"));
        }

        let bar = Bar {
            date: parse_date(field(columns.date)).wrap_err_with(|| format!("row {row}"))?,
            close: field(columns.close)
                .parse()
                .wrap_err_with(|| format!("row {row}: bad close"))?,
            volume: volume as u64,
        };

        trades.insert(bar.date, bar);
    }

    Ok(trades
        .into_iter()
        .filter(|(_, b)| b.close != 0f64)
        .collect())
}

fn parse_date(s: &str) -> eyre::Result<NaiveDateTime> {
    if let Ok(date) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(date);
    }
    if let Ok(date) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(date.naive_local());
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .wrap_err_with(|| format!("unrecognized date {s:?}"))?;
    Ok(date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, fs};

    use chrono::NaiveDate;

    use super::*;
    use crate::metrics::tests::make_bars;

    const CSV: &str = "\
Date,Open,High,Low,Close,Volume,Dividends,Stock Splits
2024-01-02 00:00:00-05:00,187.15,188.44,183.89,185.64,82488700,0.0,0.0
2024-01-03 00:00:00-05:00,184.22,185.88,183.43,184.25,58414500,0.0,0.0
2024-01-04 00:00:00-05:00,182.15,183.09,180.88,,0,0.0,0.0
2024-01-05 00:00:00-05:00,181.99,182.76,180.17,181.18,62303300,0.0,0.0
2024-01-05 00:00:00-05:00,181.99,182.76,180.17,181.18,62303300,0.0,0.0
2024-01-08 00:00:00-05:00,182.09,185.60,181.50,0,0,0.0,0.0
";

    fn ticker(s: &str) -> Ticker {
        Ticker::new(s).unwrap()
    }

    #[test]
    fn unittest_csv_provider() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("AAPL.csv"), CSV)?;

        let provider = CsvProvider::new(dir.path());
        let bars = provider.fetch(&ticker("aapl"), Period::OneMonth)?;

        assert_eq!(bars.len(), 3);
        assert_eq!(
            bars[0].date.date(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[0].volume, 82_488_700);
        assert_eq!(bars[2].close, 181.18);
        assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
        Ok(())
    }

    #[test]
    fn unittest_csv_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvProvider::new(dir.path());
        let err = provider.fetch(&ticker("NOPE"), Period::OneYear).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn unittest_csv_provider_missing_column() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("X.csv"), "Date,Open\n2024-01-02,1.0\n")?;
        let err = CsvProvider::new(dir.path())
            .fetch(&ticker("X"), Period::OneMonth)
            .unwrap_err();
        assert!(format!("{err:#}").contains("Close"));
        Ok(())
    }

    #[test]
    fn unittest_csv_provider_rejects_bad_volume() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let provider = CsvProvider::new(dir.path());

        for volume in ["-5", "NaN", "inf"] {
            fs::write(
                dir.path().join("BAD.csv"),
                format!("Date,Close,Volume\n2024-01-02,100.0,10\n2024-01-03,101.0,{volume}\n"),
            )?;
            let err = provider.fetch(&ticker("BAD"), Period::OneMonth).unwrap_err();
            assert!(format!("{err:#}").contains("row 3: bad volume"), "{err:#}");
        }
        Ok(())
    }

    #[test]
    fn unittest_parse_date_formats() -> eyre::Result<()> {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(parse_date("2024-01-02")?.date(), expected);
        assert_eq!(parse_date("2024-01-02 16:00:00")?.date(), expected);
        assert_eq!(parse_date("2024-01-02 00:00:00-05:00")?.date(), expected);
        assert!(parse_date("01/02/2024").is_err());
        Ok(())
    }

    #[test]
    fn unittest_period_window() -> eyre::Result<()> {
        // 100 consecutive days starting 2024-01-01, last bar 2024-04-09.
        let closes = vec![1.0; 100];
        let provider = InMemoryProvider::default().with_series(ticker("T"), make_bars(&closes));

        let month = provider.fetch(&ticker("T"), Period::OneMonth)?;
        assert_eq!(month.len(), 31);
        assert_eq!(
            month[0].date.date(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );

        let year = provider.fetch(&ticker("T"), Period::OneYear)?;
        assert_eq!(year.len(), 100);

        assert!(provider.fetch(&ticker("OTHER"), Period::OneYear)?.is_empty());
        Ok(())
    }

    struct CountingProvider {
        calls: Cell<usize>,
        fail: bool,
    }

    impl MarketDataProvider for CountingProvider {
        fn fetch(&self, _: &Ticker, _: Period) -> eyre::Result<Vec<Bar>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(eyre!("provider down"));
            }
            Ok(make_bars(&[1.0, 2.0]))
        }
    }

    #[test]
    fn unittest_cached_provider_reuses_fresh_entries() -> eyre::Result<()> {
        let inner = CountingProvider {
            calls: Cell::new(0),
            fail: false,
        };
        let cached = CachedProvider::new(inner, ProviderConfig::default());

        let first = cached.fetch(&ticker("AAPL"), Period::OneMonth)?;
        let second = cached.fetch(&ticker("AAPL"), Period::OneMonth)?;
        assert_eq!(first, second);
        assert_eq!(cached.inner().calls.get(), 1);

        cached.fetch(&ticker("AAPL"), Period::ThreeMonths)?;
        cached.fetch(&ticker("MSFT"), Period::OneMonth)?;
        assert_eq!(cached.inner().calls.get(), 3);

        cached.clear();
        cached.fetch(&ticker("AAPL"), Period::OneMonth)?;
        assert_eq!(cached.inner().calls.get(), 4);
        Ok(())
    }

    #[test]
    fn unittest_cached_provider_zero_ttl() -> eyre::Result<()> {
        let inner = CountingProvider {
            calls: Cell::new(0),
            fail: false,
        };
        let cached = CachedProvider::new(inner, ProviderConfig::default().with_ttl_seconds(0));

        cached.fetch(&ticker("AAPL"), Period::OneMonth)?;
        cached.fetch(&ticker("AAPL"), Period::OneMonth)?;
        assert_eq!(cached.inner().calls.get(), 2);
        Ok(())
    }

    #[test]
    fn unittest_cached_provider_skips_failures() {
        let inner = CountingProvider {
            calls: Cell::new(0),
            fail: true,
        };
        let cached = CachedProvider::new(inner, ProviderConfig::default());

        assert!(cached.fetch(&ticker("AAPL"), Period::OneMonth).is_err());
        assert!(cached.fetch(&ticker("AAPL"), Period::OneMonth).is_err());
        assert_eq!(cached.inner().calls.get(), 2);
    }
}

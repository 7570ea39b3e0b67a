use chrono::NaiveDateTime;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MetricsError, Result},
    model::{Bar, Price, PriceSeries, SeriesPoint},
    utils::Accumulator,
};

pub const DEFAULT_MA_WINDOW: usize = 7;
pub const DEFAULT_PRINCIPAL: f64 = 1000.0;

/// Percent units, applied to the daily return standard deviation.
pub const HIGH_VOLATILITY: f64 = 4.0;
pub const MODERATE_VOLATILITY: f64 = 2.0;

const MIN_BARS: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    principal: f64,
    ma_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            principal: DEFAULT_PRINCIPAL,
            ma_window: DEFAULT_MA_WINDOW,
        }
    }
}

impl MetricsConfig {
    pub fn with_principal(mut self, value: f64) -> Self {
        self.principal = value;
        self
    }

    pub fn with_ma_window(mut self, value: usize) -> Self {
        self.ma_window = value;
        self
    }

    pub fn principal(&self) -> f64 {
        self.principal
    }

    pub fn ma_window(&self) -> usize {
        self.ma_window
    }
}

/// Checks the fetched bars and wraps them in a [`PriceSeries`].
///
/// An empty batch and a batch shorter than two bars are reported separately so
/// the caller can tell "no data for this ticker" from "try a longer period".
pub fn validate(bars: Vec<Bar>) -> Result<PriceSeries> {
    if bars.is_empty() {
        return Err(MetricsError::EmptySeries);
    }
    if bars.len() < MIN_BARS {
        return Err(MetricsError::InsufficientData {
            len: bars.len(),
            required: MIN_BARS,
        });
    }

    for (index, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() || bar.close < 0.0 {
            return Err(MetricsError::InvalidClose {
                index,
                close: bar.close,
            });
        }
    }

    if let Some((index, _)) = bars
        .iter()
        .tuple_windows()
        .find_position(|(prev, next)| next.date <= prev.date)
    {
        return Err(MetricsError::UnorderedBars { index: index + 1 });
    }

    debug!("validated {} bars", bars.len());
    Ok(PriceSeries::new_unchecked(bars))
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestChange {
    pub date: NaiveDateTime,
    pub current: Price,
    pub previous: Price,
    pub change: Price,
    /// Absent when the previous close is zero.
    pub change_pct: Option<f64>,
    pub volume: u64,
}

pub fn latest_change(series: &PriceSeries) -> LatestChange {
    let bars = series.bars();
    let previous = bars[bars.len() - 2].close;
    let latest = *series.last();

    let change = latest.close - previous;

    LatestChange {
        date: latest.date,
        current: latest.close,
        previous,
        change,
        change_pct: (previous != 0.0).then(|| change / previous * 100.0),
        volume: latest.volume,
    }
}

/// Trailing simple moving average; the first `window - 1` points are absent.
pub fn moving_average(series: &PriceSeries, window: usize) -> Result<Vec<SeriesPoint>> {
    if window == 0 {
        return Err(MetricsError::InvalidWindow { window });
    }

    let bars = series.bars();

    Ok(bars
        .iter()
        .enumerate()
        .map(|(ix, bar)| {
            let value = if ix + 1 >= window {
                bars[ix + 1 - window..=ix]
                    .iter()
                    .map(|b| b.close)
                    .collect::<Accumulator>()
                    .avg()
            } else {
                None
            };

            SeriesPoint {
                date: bar.date,
                value,
            }
        })
        .collect())
}

/// Close-to-close percent change. The first point is always absent, as is any
/// point whose previous close is zero.
pub fn daily_returns(series: &PriceSeries) -> Vec<SeriesPoint> {
    let first = SeriesPoint {
        date: series.first().date,
        value: None,
    };

    std::iter::once(first)
        .chain(
            series
                .bars()
                .iter()
                .tuple_windows()
                .map(|(prev, next)| SeriesPoint {
                    date: next.date,
                    value: (prev.close != 0.0)
                        .then(|| (next.close - prev.close) / prev.close * 100.0),
                }),
        )
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatistics {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (N-1 divisor); absent for a single return.
    pub std_dev: Option<f64>,
    pub max: f64,
    pub min: f64,
}

/// Aggregates the defined entries of a return series. Absent points are
/// skipped, never counted as zero.
pub fn return_statistics(returns: &[SeriesPoint]) -> Result<ReturnStatistics> {
    let values = returns.iter().filter_map(|p| p.value).collect_vec();
    let acc: Accumulator = values.iter().copied().collect();

    let mean = acc.avg().ok_or(MetricsError::NoData)?;
    let max = acc.max().ok_or(MetricsError::NoData)?;
    let min = acc.min().ok_or(MetricsError::NoData)?;

    Ok(ReturnStatistics {
        count: acc.len(),
        mean,
        std_dev: sample_std_dev(&values, mean),
        max,
        min,
    })
}

fn sample_std_dev(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;

    Some(variance.sqrt())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    High,
    Moderate,
    Low,
}

pub fn classify_volatility(std_dev: f64) -> Volatility {
    if std_dev > HIGH_VOLATILITY {
        Volatility::High
    } else if std_dev > MODERATE_VOLATILITY {
        Volatility::Moderate
    } else {
        Volatility::Low
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnDirection {
    Gain,
    Loss,
}

impl ReturnDirection {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Self::Gain
        } else {
            Self::Loss
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentOutcome {
    Profit,
    Loss,
}

impl InvestmentOutcome {
    /// A break-even result counts as a loss.
    pub fn of(profit: f64) -> Self {
        if profit > 0.0 {
            Self::Profit
        } else {
            Self::Loss
        }
    }
}

/// Buy-and-hold from the first close to the latest close.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentResult {
    pub principal: f64,
    pub shares: f64,
    pub current_value: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub outcome: InvestmentOutcome,
}

pub fn simulate_investment(series: &PriceSeries, principal: f64) -> Result<InvestmentResult> {
    // Also rejects NaN.
    if !(principal > 0.0) {
        return Err(MetricsError::InvalidPrincipal { principal });
    }

    let first_close = series.first().close;
    if first_close == 0.0 {
        return Err(MetricsError::DivisionByZero {
            what: "first close",
        });
    }

    let shares = principal / first_close;
    let current_value = shares * series.last().close;
    let profit = current_value - principal;

    Ok(InvestmentResult {
        principal,
        shares,
        current_value,
        profit,
        profit_pct: profit / principal * 100.0,
        outcome: InvestmentOutcome::of(profit),
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub max: Price,
    pub min: Price,
    pub mean: Price,
    pub first: Price,
    pub current: Price,
    pub total_return_pct: f64,
}

pub fn summary_statistics(series: &PriceSeries) -> Result<SummaryStatistics> {
    let acc: Accumulator = series.closes().collect();
    let first = series.first().close;
    let current = series.last().close;

    if first == 0.0 {
        return Err(MetricsError::DivisionByZero {
            what: "first close",
        });
    }

    Ok(SummaryStatistics {
        max: acc.max().ok_or(MetricsError::EmptySeries)?,
        min: acc.min().ok_or(MetricsError::EmptySeries)?,
        mean: acc.avg().ok_or(MetricsError::EmptySeries)?,
        first,
        current,
        total_return_pct: (current - first) / first * 100.0,
    })
}

/// Everything the presentation layer shows for one (ticker, period) request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub last_updated: NaiveDateTime,
    pub latest: LatestChange,
    pub prices: Vec<SeriesPoint>,
    pub moving_average: Vec<SeriesPoint>,
    pub daily_returns: Vec<SeriesPoint>,
    /// Aligned with `daily_returns`; absent where the return is absent.
    pub return_directions: Vec<Option<ReturnDirection>>,
    pub return_stats: ReturnStatistics,
    /// Absent when fewer than two returns are defined, since the sample
    /// deviation needs at least two.
    pub volatility: Option<Volatility>,
    pub investment: InvestmentResult,
    pub summary: SummaryStatistics,
}

pub fn compute(series: &PriceSeries, config: &MetricsConfig) -> Result<DerivedMetrics> {
    let moving_average = moving_average(series, config.ma_window())?;
    let daily_returns = daily_returns(series);
    let return_stats = return_statistics(&daily_returns)?;
    let investment = simulate_investment(series, config.principal())?;
    let summary = summary_statistics(series)?;

    let return_directions = daily_returns
        .iter()
        .map(|p| p.value.map(ReturnDirection::of))
        .collect();

    let prices = series
        .bars()
        .iter()
        .map(|b| SeriesPoint {
            date: b.date,
            value: Some(b.close),
        })
        .collect();

    debug!(
        "computed metrics over {} bars, {} returns",
        series.len(),
        return_stats.count
    );

    Ok(DerivedMetrics {
        last_updated: series.last().date,
        latest: latest_change(series),
        prices,
        moving_average,
        daily_returns,
        return_directions,
        volatility: return_stats.std_dev.map(classify_volatility),
        return_stats,
        investment,
        summary,
    })
}

use std::str::FromStr;

use chrono::{Months, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

pub type Price = f64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: &str) -> Result<Self, MetricsError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MetricsError::EmptyTicker);
        }
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = MetricsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

/// Lookback window of a history request.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    #[default]
    #[display(fmt = "1mo")]
    OneMonth,
    #[display(fmt = "3mo")]
    ThreeMonths,
    #[display(fmt = "6mo")]
    SixMonths,
    #[display(fmt = "1y")]
    OneYear,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
    ];

    pub fn months(&self) -> u32 {
        match self {
            Period::OneMonth => 1,
            Period::ThreeMonths => 3,
            Period::SixMonths => 6,
            Period::OneYear => 12,
        }
    }

    /// Earliest instant (exclusive) still inside the period ending at `last`.
    pub fn cutoff(&self, last: NaiveDateTime) -> Option<NaiveDateTime> {
        last.checked_sub_months(Months::new(self.months()))
    }
}

impl FromStr for Period {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MetricsError::UnknownPeriod(s.to_owned()))
    }
}

impl TryFrom<String> for Period {
    type Error = MetricsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDateTime,
    pub close: Price,
    pub volume: u64,
}

/// Bars in strictly ascending date order, at least two of them.
///
/// Only [`crate::metrics::validate`] builds one, so every engine operation can
/// rely on the latest and previous bar existing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub(crate) fn new_unchecked(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn closes(&self) -> impl Iterator<Item = Price> + '_ {
        self.bars.iter().map(|b| b.close)
    }
}

/// A dated value that may be absent, e.g. during a moving average warm-up.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDateTime,
    pub value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Period, Ticker};
    use crate::error::MetricsError;

    #[test]
    fn unittest_ticker_normalizes_input() -> eyre::Result<()> {
        assert_eq!(Ticker::new("  aapl ")?.as_str(), "AAPL");
        assert_eq!(Ticker::new("msft")?.to_string(), "MSFT");
        assert!(matches!(Ticker::new("   "), Err(MetricsError::EmptyTicker)));
        Ok(())
    }

    #[test]
    fn unittest_period_parse_and_display() -> eyre::Result<()> {
        for period in Period::ALL {
            assert_eq!(period.to_string().parse::<Period>()?, period);
        }
        assert_eq!("1Y".parse::<Period>()?, Period::OneYear);
        assert!(matches!(
            "2w".parse::<Period>(),
            Err(MetricsError::UnknownPeriod(s)) if s == "2w"
        ));
        Ok(())
    }

    #[test]
    fn unittest_period_cutoff() {
        let last = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let cutoff = Period::OneMonth.cutoff(last).unwrap();
        assert_eq!(cutoff.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let cutoff = Period::OneYear.cutoff(last).unwrap();
        assert_eq!(cutoff.date(), NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
    }

    #[test]
    fn unittest_period_serde() -> eyre::Result<()> {
        let json = serde_json::to_string(&Period::SixMonths)?;
        assert_eq!(json, "\"6mo\"");
        let period: Period = serde_json::from_str("\"3mo\"")?;
        assert_eq!(period, Period::ThreeMonths);
        Ok(())
    }
}

use thiserror::Error;

/// Precondition failures raised by the metrics engine.
///
/// Every variant is local to one computation; callers recover by fetching a
/// different ticker or period and trying again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("not enough data: {len} bar(s), need at least {required}")]
    InsufficientData { len: usize, required: usize },

    #[error("no defined returns to aggregate")]
    NoData,

    #[error("invalid principal {principal}: must be greater than zero")]
    InvalidPrincipal { principal: f64 },

    #[error("division by zero: {what} is zero")]
    DivisionByZero { what: &'static str },

    #[error("invalid moving average window {window}")]
    InvalidWindow { window: usize },

    #[error("bar {index} is not after the previous bar")]
    UnorderedBars { index: usize },

    #[error("bar {index} has invalid close {close}")]
    InvalidClose { index: usize, close: f64 },

    #[error("ticker symbol is empty")]
    EmptyTicker,

    #[error("unknown period {0:?}, expected one of 1mo, 3mo, 6mo, 1y")]
    UnknownPeriod(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

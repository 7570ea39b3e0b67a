pub mod analysis;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod utils;

pub use analysis::{Dashboard, DashboardConfig, DashboardReport};
pub use error::MetricsError;
pub use model::{Bar, Period, PriceSeries, SeriesPoint, Ticker};

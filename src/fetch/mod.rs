pub mod klines;

pub use klines::{Kline, KlineFetcher, RateSignal};

/// Candle granularity handled by this tool.
pub const INTERVAL: &str = "1m";
pub const INTERVAL_MS: i64 = 60_000;

/// Exchange-imposed maximum number of rows per kline request.
pub const PAGE_LIMIT: u32 = 1500;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::error::{Context, Result};
use crate::fetch::{INTERVAL, PAGE_LIMIT};
use crate::utils::ms_to_utc;

const KLINES_ENDPOINT: &str = "https://api.binance.com/api/v1/klines";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Weight consumed in the current one-minute window, as reported by the exchange.
const USED_WEIGHT_HEADER: &str = "X-MBX-USED-WEIGHT-1M";
const RETRY_AFTER_DEFAULT_SECS: u64 = 240;

/// Weight level at which a cool-down is taken before the hard limit trips.
const SOFT_WEIGHT_CEILING: u64 = 2200;
const SOFT_COOLDOWN: Duration = Duration::from_secs(60);

/// One fixed-interval OHLC observation keyed by its open time.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
    pub close_time: DateTime<Utc>,
    pub quote_volume: f32,
    pub trade_count: i32,
    pub taker_buy_volume: f32,
    pub taker_buy_quote_volume: f32,
}

/// Outcome of interpreting one kline response.
#[derive(Debug)]
pub enum RateSignal {
    /// A page of rows; the caller advances its cursor and keeps going.
    Data(Vec<Kline>),
    /// A page of rows plus a cool-down to honor once the page is applied,
    /// taken when the reported weight is close to the per-minute budget.
    SoftThrottle(Vec<Kline>, Duration),
    /// Hard rate limit; the caller retries the identical window after sleeping.
    RetryAfter(Duration),
    /// Transport-level failure; terminal for the current job.
    TransientError,
    /// Non-success status or no rows left in the window; terminal.
    FatalError,
}

/// Positional row as served by the exchange: twelve fields, the last unused.
#[derive(Debug, Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    IgnoredAny,
);

impl RawKline {
    fn into_kline(self) -> Option<Kline> {
        Some(Kline {
            open_time: ms_to_utc(self.0)?,
            open: self.1.parse().ok()?,
            high: self.2.parse().ok()?,
            low: self.3.parse().ok()?,
            close: self.4.parse().ok()?,
            volume: self.5.parse().ok()?,
            close_time: ms_to_utc(self.6)?,
            quote_volume: self.7.parse().ok()?,
            trade_count: i32::try_from(self.8).ok()?,
            taker_buy_volume: self.9.parse().ok()?,
            taker_buy_quote_volume: self.10.parse().ok()?,
        })
    }
}

/// Turns one bounded kline request into exactly one `RateSignal`. Every
/// failure mode is represented in the returned value; nothing is raised
/// across this boundary, and no retries happen inside it.
pub struct KlineFetcher {
    client: Client,
}

impl KlineFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to construct kline HTTP client")?;
        Ok(Self { client })
    }

    /// Issue a single request for the window starting at `start_ms` and
    /// interpret the status, rate-limit headers, and body.
    pub fn fetch_page(&self, symbol: &str, start_ms: i64, end_ms: i64) -> RateSignal {
        let response = match self
            .client
            .get(KLINES_ENDPOINT)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", INTERVAL.to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ])
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Kline request error for {}: {}", symbol, e);
                return RateSignal::TransientError;
            }
        };

        let status = response.status();
        let used_weight = header_u64(&response, USED_WEIGHT_HEADER).unwrap_or(0);
        log::info!("{} used weight {} this minute", symbol, used_weight);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_secs =
                header_u64(&response, "Retry-After").unwrap_or(RETRY_AFTER_DEFAULT_SECS);
            return RateSignal::RetryAfter(Duration::from_secs(retry_secs));
        }

        if !status.is_success() {
            log::warn!("Kline request for {} failed with status {}", symbol, status);
            return RateSignal::FatalError;
        }

        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read kline body for {}: {}", symbol, e);
                return RateSignal::TransientError;
            }
        };

        let rows = match parse_rows(&body) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Malformed kline payload for {}: {}", symbol, e);
                return RateSignal::TransientError;
            }
        };

        if rows.is_empty() {
            log::warn!("No kline rows for {} (status {})", symbol, status);
            return RateSignal::FatalError;
        }

        if used_weight > SOFT_WEIGHT_CEILING {
            return RateSignal::SoftThrottle(rows, SOFT_COOLDOWN);
        }

        RateSignal::Data(rows)
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Decode the positional row array, skipping rows whose fields fail coercion.
fn parse_rows(body: &str) -> serde_json::Result<Vec<Kline>> {
    let raw: Vec<RawKline> = serde_json::from_str(body)?;
    Ok(raw.into_iter().filter_map(RawKline::into_kline).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        [1704067200000, "42000.1", "42010.5", "41990.0", "42005.3", "12.5",
         1704067259999, "525062.0", 321, "6.2", "260431.0", "0"],
        [1704067260000, "42005.3", "42020.0", "42000.0", "42015.0", "8.1",
         1704067319999, "340313.0", 198, "4.0", "168060.0", "0"]
    ]"#;

    #[test]
    fn decodes_positional_rows() {
        let rows = parse_rows(SAMPLE).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open_time.timestamp_millis(), 1_704_067_200_000);
        assert!((rows[0].open - 42000.1).abs() < 1e-1);
        assert!((rows[0].volume - 12.5).abs() < 1e-6);
        assert_eq!(rows[0].trade_count, 321);
        assert_eq!(rows[1].close_time.timestamp_millis(), 1_704_067_319_999);
        assert!(rows[0].open_time < rows[1].open_time);
    }

    #[test]
    fn skips_rows_that_fail_coercion() {
        let body = r#"[
            [1704067200000, "not-a-price", "1", "1", "1", "1",
             1704067259999, "1", 1, "1", "1", "0"],
            [1704067260000, "42005.3", "42020.0", "42000.0", "42015.0", "8.1",
             1704067319999, "340313.0", 198, "4.0", "168060.0", "0"]
        ]"#;

        let rows = parse_rows(body).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].open_time.timestamp_millis(), 1_704_067_260_000);
    }

    #[test]
    fn empty_array_yields_no_rows() {
        assert!(parse_rows("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_rows("{\"code\":-1121}").is_err());
        assert!(parse_rows("not json").is_err());
    }
}

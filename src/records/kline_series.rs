use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::{Context, Result};
use crate::fetch::Kline;

/// Finished, deduplicated per-symbol series plus its persistence helpers.
pub struct KlineSeries {
    pub symbol: String,
    pub rows: Vec<Kline>,
}

impl KlineSeries {
    pub fn new(symbol: &str, rows: Vec<Kline>) -> Self {
        Self {
            symbol: symbol.to_string(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columnar view of the series with the open time leading as the
    /// ordered key column.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let n = self.rows.len();
        let mut open_time_ms = Vec::with_capacity(n);
        let mut open = Vec::with_capacity(n);
        let mut high = Vec::with_capacity(n);
        let mut low = Vec::with_capacity(n);
        let mut close = Vec::with_capacity(n);
        let mut volume = Vec::with_capacity(n);
        let mut close_time_ms = Vec::with_capacity(n);
        let mut quote_vol = Vec::with_capacity(n);
        let mut n_trades = Vec::with_capacity(n);
        let mut taker_buy_vol = Vec::with_capacity(n);
        let mut taker_buy_quote = Vec::with_capacity(n);

        for row in &self.rows {
            open_time_ms.push(row.open_time.timestamp_millis());
            open.push(row.open);
            high.push(row.high);
            low.push(row.low);
            close.push(row.close);
            volume.push(row.volume);
            close_time_ms.push(row.close_time.timestamp_millis());
            quote_vol.push(row.quote_volume);
            n_trades.push(row.trade_count);
            taker_buy_vol.push(row.taker_buy_volume);
            taker_buy_quote.push(row.taker_buy_quote_volume);
        }

        let datetime = Int64Chunked::from_vec("datetime", open_time_ms)
            .into_datetime(TimeUnit::Milliseconds, Some("UTC".to_string()))
            .into_series();
        let close_time = Int64Chunked::from_vec("close_time", close_time_ms)
            .into_datetime(TimeUnit::Milliseconds, Some("UTC".to_string()))
            .into_series();

        let frame = DataFrame::new(vec![
            datetime,
            Series::new("open", open),
            Series::new("high", high),
            Series::new("low", low),
            Series::new("close", close),
            Series::new("volume", volume),
            close_time,
            Series::new("quote_vol", quote_vol),
            Series::new("n_trades", n_trades),
            Series::new("taker_buy_vol", taker_buy_vol),
            Series::new("taker_buy_quote", taker_buy_quote),
        ])?;

        Ok(frame)
    }

    /// Write the series as a snappy-compressed Parquet file.
    pub fn save_to_parquet<P: AsRef<Path>>(&self, file_path: P) -> Result<()> {
        let mut frame = self.to_dataframe()?;
        let file = File::create(file_path.as_ref())
            .with_context(|| format!("Failed to create {}", file_path.as_ref().display()))?;

        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut frame)?;

        Ok(())
    }
}

/// Deterministic artifact name for one (symbol, interval, start, end) job.
pub fn artifact_name(symbol: &str, interval: &str, start_date: &str, end_date: &str) -> String {
    format!(
        "{}_{}_{}_to_{}.parquet",
        symbol, interval, start_date, end_date
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::INTERVAL_MS;
    use chrono::{TimeZone, Utc};

    fn sample_series() -> KlineSeries {
        let base_ms = 1_704_067_200_000;
        let rows = (0..2)
            .map(|i| {
                let ms = base_ms + i * INTERVAL_MS;
                Kline {
                    open_time: Utc.timestamp_millis_opt(ms).single().unwrap(),
                    open: 42000.0 + i as f32,
                    high: 42010.0,
                    low: 41990.0,
                    close: 42005.0,
                    volume: 12.5,
                    close_time: Utc.timestamp_millis_opt(ms + INTERVAL_MS - 1).single().unwrap(),
                    quote_volume: 525062.0,
                    trade_count: 321,
                    taker_buy_volume: 6.2,
                    taker_buy_quote_volume: 260431.0,
                }
            })
            .collect();
        KlineSeries::new("BTCUSDT", rows)
    }

    #[test]
    fn frame_has_the_expected_shape_and_types() {
        let frame = sample_series().to_dataframe().unwrap();

        assert_eq!(frame.height(), 2);
        assert_eq!(
            frame.get_column_names(),
            vec![
                "datetime",
                "open",
                "high",
                "low",
                "close",
                "volume",
                "close_time",
                "quote_vol",
                "n_trades",
                "taker_buy_vol",
                "taker_buy_quote",
            ]
        );
        assert_eq!(
            frame.column("open").unwrap().dtype(),
            &DataType::Float32
        );
        assert_eq!(
            frame.column("n_trades").unwrap().dtype(),
            &DataType::Int32
        );
    }

    #[test]
    fn parquet_round_trip_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join(artifact_name("BTCUSDT", "1m", "2024-01-01", "2024-01-02"));

        sample_series().save_to_parquet(&path).unwrap();

        let file = File::open(&path).unwrap();
        let frame = ParquetReader::new(file).finish().unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.get_column_names()[0], "datetime");
    }

    #[test]
    fn artifact_name_is_deterministic() {
        assert_eq!(
            artifact_name("ETHUSDT", "1m", "2023-05-01", "2023-06-01"),
            "ETHUSDT_1m_2023-05-01_to_2023-06-01.parquet"
        );
    }
}

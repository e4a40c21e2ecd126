pub mod kline_series;

pub use kline_series::{artifact_name, KlineSeries};

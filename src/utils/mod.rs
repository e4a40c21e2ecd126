pub mod time;

pub use time::{ms_to_utc, parse_utc_date, utc_date_ms};

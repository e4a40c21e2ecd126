use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::{AppError, Result};

/// Parse a `YYYY-MM-DD` date into its UTC-midnight instant.
pub fn parse_utc_date(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")?;
    let Some(naive) = date.and_hms_opt(0, 0, 0) else {
        return Err(AppError::message(format!(
            "Unable to construct timestamp from date {}",
            value
        )));
    };
    Ok(Utc.from_utc_datetime(&naive))
}

pub fn utc_date_ms(value: &str) -> Result<i64> {
    Ok(parse_utc_date(value)?.timestamp_millis())
}

/// Millisecond epoch timestamp back to a UTC instant; `None` when out of range.
pub fn ms_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_to_utc_midnight_millis() {
        assert_eq!(utc_date_ms("2024-01-01").unwrap(), 1_704_067_200_000);
        assert_eq!(utc_date_ms(" 2024-01-02 ").unwrap(), 1_704_153_600_000);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(utc_date_ms("01/02/2024").is_err());
        assert!(utc_date_ms("2024-13-01").is_err());
    }

    #[test]
    fn millis_round_trip() {
        let instant = parse_utc_date("2023-06-15").unwrap();
        assert_eq!(ms_to_utc(instant.timestamp_millis()), Some(instant));
    }
}

//! Parsing of the date formats found in the states' metadata feeds.

use chrono::{DateTime, NaiveDate};

/// Parse a feed date.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a time part, as in RFC 3339
/// timestamps), `DD.MM.YYYY`, `YYYYMMDD`, `YYYY-MM` (dated the 1st) and epoch
/// milliseconds (interpreted as UTC).
pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    parse_feed_date_with_day(raw, 1)
}

/// Like [`parse_feed_date`], but month-only dates (`YYYY-MM`) get `day`.
pub fn parse_feed_date_with_day(raw: &str, day: u32) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }

    if s.len() >= 10 {
        if let Some(prefix) = s.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(date);
            }
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%d.%m.%Y") {
                return Some(date);
            }
        }
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return match s.len() {
            8 => NaiveDate::parse_from_str(s, "%Y%m%d").ok(),
            // Epoch milliseconds (ArcGIS style attributes)
            11..=13 => s
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.date_naive()),
            _ => None,
        };
    }

    if s.len() == 7 && s.as_bytes()[4] == b'-' {
        let year: i32 = s.get(..4)?.parse().ok()?;
        let month: u32 = s.get(5..)?.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

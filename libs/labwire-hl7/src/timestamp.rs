//! HL7 TS helpers.
//!
//! Instruments truncate the `YYYYMMDDHHMMSS` form at any component boundary;
//! parsing accepts the common prefixes and refuses the rest.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse an HL7 TS value. Empty input and unparseable values are `None`;
/// callers treat a missing timestamp as "unknown", never as an error.
pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    let digits: &str = value.split(['+', '-', '.']).next().unwrap_or("");
    let naive: NaiveDateTime = match digits.len() {
        8 => NaiveDate::parse_from_str(digits, "%Y%m%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?,
        12 => NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M").ok()?,
        14 => NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?,
        _ => return None,
    };
    Some(Utc.from_utc_datetime(&naive))
}

/// Format a timestamp in the full TS form.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

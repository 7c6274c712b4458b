use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Fixed-width UTC timestamp format used for every stored timestamp.
/// Lexicographic order matches chronological order, so date-range filters
/// are plain string comparisons in SQL.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

/// Accepts either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date
/// (interpreted as midnight UTC). Used for request parameters.
pub fn parse_ts_param(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    parse_ts(raw).or_else(|| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

//! Alignment of provider time series (a `time` array next to value arrays).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse an Open-Meteo timestamp. Local forms without an offset
/// (`2025-07-10T10:00`) are taken as-is, offset forms are converted to UTC,
/// and a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|value| value.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Value paired with the latest timestamp that is `<= reference`.
///
/// `timestamps` must be sorted ascending: the scan stops at the first
/// timestamp after `reference` (or the first one that does not parse), so
/// only the matching prefix is visited. Unsorted input gives wrong answers.
/// Returns `None` when the first timestamp is already after `reference`.
pub fn last_value_before<S, T>(timestamps: &[S], values: &[T], reference: NaiveDateTime) -> Option<T>
where
    S: AsRef<str>,
    T: Clone,
{
    let mut last = None;
    for (index, raw) in timestamps.iter().enumerate() {
        match parse_timestamp(raw.as_ref()) {
            Some(timestamp) if timestamp <= reference => last = values.get(index).cloned(),
            _ => break,
        }
    }
    last
}

use crate::errors::{Error, Result};
use crate::model::BatchRow;
use chrono::{DateTime, Duration, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use tracing::warn;

pub const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Spans wider than this (one week) are logged: the output holds one entry per minute.
const WIDE_SPAN_MINUTES: i64 = 7 * 24 * 60;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an ISO-8601 timestamp. Offsets are converted to UTC; naive values are taken as-is.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.naive_utc());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| Error::Input(format!("unrecognised timestamp {:?}", value)))
}

fn floor_to_minute(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean temperature per minute over the full observed range.
///
/// Minutes without readings between the first and last observed minute are
/// reported as `0.0`. Values are rounded to two decimals and keyed by
/// [`MINUTE_FORMAT`]. An empty batch is an [`Error::EmptyInput`].
///
/// Output size grows with the time span, not the row count: two readings a
/// year apart yield roughly half a million entries.
pub fn aggregate_by_minute(rows: &[BatchRow]) -> Result<BTreeMap<String, f64>> {
    if rows.is_empty() {
        return Err(Error::EmptyInput(
            "batch contains no readings to aggregate".to_string(),
        ));
    }

    let mut sums: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let minute = floor_to_minute(parse_timestamp(&row.timestamp)?);
        let entry = sums.entry(minute).or_insert((0.0, 0));
        entry.0 += row.temperature;
        entry.1 += 1;
    }

    // Non-empty, so both ends exist.
    let (Some(&first), Some(&last)) = (sums.keys().next(), sums.keys().next_back()) else {
        return Err(Error::EmptyInput("batch contains no readings".to_string()));
    };

    let span_minutes = (last - first).num_minutes();
    if span_minutes > WIDE_SPAN_MINUTES {
        warn!(
            "Batch spans {} minutes ({} to {}), the report will hold an entry for each",
            span_minutes, first, last
        );
    }

    let mut series = BTreeMap::new();
    let mut minute = first;
    while minute <= last {
        let mean = sums
            .get(&minute)
            .map(|&(sum, count)| sum / count as f64)
            .unwrap_or(0.0);
        series.insert(minute.format(MINUTE_FORMAT).to_string(), round2(mean));
        minute += Duration::minutes(1);
    }

    Ok(series)
}

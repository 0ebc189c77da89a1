//! Time utilities for stage deadline arithmetic.
//!
//! Stage snapshots store calendar date and time-of-day as separate string
//! fields. The helpers here combine them into comparable instants and
//! compute signed time-remaining deltas. Negative remaining time means the
//! deadline has passed; callers interpret sign and magnitude themselves.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{Result, TafweejError};

/// Seconds per hour, as f64 for remaining-time math.
const SECS_PER_HOUR: f64 = 3600.0;

/// Combine a calendar date (`%Y-%m-%d`) and a time-of-day (`%H:%M` or
/// `%H:%M:%S`) into a single UTC instant.
pub fn to_instant(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let date_part = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
        TafweejError::invalid_time_format(date, time, format!("bad date: {e}"))
    })?;

    let time_part = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|e| TafweejError::invalid_time_format(date, time, format!("bad time: {e}")))?;

    Ok(date_part.and_time(time_part).and_utc())
}

/// Signed hours between `now` and `end`. Negative means overdue.
pub fn hours_remaining(now: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end.signed_duration_since(now);
    delta.num_milliseconds() as f64 / (SECS_PER_HOUR * 1000.0)
}

/// Human phrase for a remaining-time value. Display only; classification
/// never routes through this.
pub fn format_remaining(hours: f64) -> String {
    if hours <= 0.0 {
        "past due".to_string()
    } else if hours <= 1.0 {
        "under one hour remaining".to_string()
    } else {
        format!("approximately {} hours remaining", hours.round() as i64)
    }
}

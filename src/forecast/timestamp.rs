//! Forecast start resolution
//!
//! Every provider sees the same temporal contract: a start instant aligned to
//! a quarter hour and a 48 hour half-open window after it.

use chrono::{DateTime, DurationRound, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::domain::ForecastTime;
use crate::error::ForecastError;

pub const STEP_MINUTES: i64 = 15;
pub const HORIZON_HOURS: i64 = 48;

/// Number of 15 minute steps in the horizon
pub const HORIZON_STEPS: usize = (HORIZON_HOURS * 60 / STEP_MINUTES) as usize;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn step() -> TimeDelta {
    TimeDelta::minutes(STEP_MINUTES)
}

pub fn horizon() -> TimeDelta {
    TimeDelta::hours(HORIZON_HOURS)
}

/// Round `ts` down to the previous quarter-hour boundary
pub fn floor_to_step(ts: DateTime<Utc>) -> DateTime<Utc> {
    // Truncation only fails for instants outside chrono's nanosecond range
    ts.duration_trunc(step()).unwrap_or(ts)
}

/// Parse an ISO-8601 instant. Offsets are honoured, naive values are UTC and
/// a bare date means midnight UTC.
pub fn parse_iso8601(input: &str) -> Result<DateTime<Utc>, ForecastError> {
    let trimmed = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts.and_utc());
        }
    }

    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => Ok(date.and_time(chrono::NaiveTime::MIN).and_utc()),
        Err(e) => Err(ForecastError::MalformedTimestamp {
            input: input.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Resolve the caller's timestamp to the aligned forecast start
pub fn resolve_start(
    ts: Option<&ForecastTime>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ForecastError> {
    let instant = match ts {
        None => now,
        Some(ForecastTime::At(ts)) => *ts,
        Some(ForecastTime::Iso(text)) => parse_iso8601(text)?,
    };
    Ok(floor_to_step(instant))
}

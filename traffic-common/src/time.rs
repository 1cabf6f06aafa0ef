//! Timestamp normalization between ISO-8601 strings and Unix epoch seconds
//!
//! The storage service speaks Unix integers while callers and the optimization
//! service speak ISO-8601. Everything that crosses that boundary goes through
//! [`TimestampPolicy`], which also enforces the accepted time window.
//!
//! Canonical ISO form is `YYYY-MM-DDTHH:MM:SSZ` (UTC, whole seconds).

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 2000-01-01T00:00:00Z
pub const MIN_UNIX_TIMESTAMP: i64 = 946_684_800;
/// 2100-01-01T00:00:00Z
pub const MAX_UNIX_TIMESTAMP: i64 = 4_102_444_800;

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Timestamp conversion failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Input is not ISO-8601 with an optional `Z` / numeric offset suffix
    #[error("invalid ISO-8601 timestamp: '{0}'")]
    InvalidFormat(String),

    /// Parsed fine but falls outside the accepted window
    #[error("timestamp {value} outside accepted range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// A timestamp as it appears on the wire: either representation is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Unix(i64),
    Iso(String),
}

impl From<i64> for TimestampValue {
    fn from(value: i64) -> Self {
        TimestampValue::Unix(value)
    }
}

impl From<&str> for TimestampValue {
    fn from(value: &str) -> Self {
        TimestampValue::Iso(value.to_string())
    }
}

impl From<String> for TimestampValue {
    fn from(value: String) -> Self {
        TimestampValue::Iso(value)
    }
}

impl fmt::Display for TimestampValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampValue::Unix(value) => write!(f, "{}", value),
            TimestampValue::Iso(value) => f.write_str(value),
        }
    }
}

/// Accepted timestamp window, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPolicy {
    pub min: i64,
    pub max: i64,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self {
            min: MIN_UNIX_TIMESTAMP,
            max: MAX_UNIX_TIMESTAMP,
        }
    }
}

impl TimestampPolicy {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Reject values outside `[min, max]`
    pub fn check_range(&self, unix: i64) -> Result<i64, TimestampError> {
        if unix < self.min || unix > self.max {
            return Err(TimestampError::OutOfRange {
                value: unix,
                min: self.min,
                max: self.max,
            });
        }
        Ok(unix)
    }

    /// Convert an ISO-8601 string to Unix seconds
    ///
    /// Accepts `YYYY-MM-DDTHH:MM:SS[.fff]` (or a space instead of `T`) with an
    /// optional `Z`, `±HH`, `±HHMM` or `±HH:MM` suffix. Inputs without an offset
    /// are read as UTC. Fractional seconds are truncated.
    pub fn to_unix(&self, iso: &str) -> Result<i64, TimestampError> {
        let parsed = parse_iso(iso)?;
        self.check_range(parsed.timestamp())
    }

    /// Render Unix seconds as canonical `YYYY-MM-DDTHH:MM:SSZ`
    pub fn to_iso(&self, unix: i64) -> Result<String, TimestampError> {
        let unix = self.check_range(unix)?;
        let datetime = Utc
            .timestamp_opt(unix, 0)
            .single()
            .ok_or_else(|| TimestampError::InvalidFormat(unix.to_string()))?;
        Ok(datetime.format(CANONICAL_FORMAT).to_string())
    }

    /// Accept either representation and return `(canonical_iso, unix)`
    pub fn normalize(&self, value: &TimestampValue) -> Result<(String, i64), TimestampError> {
        let unix = match value {
            TimestampValue::Unix(unix) => self.check_range(*unix)?,
            TimestampValue::Iso(iso) => self.to_unix(iso)?,
        };
        Ok((self.to_iso(unix)?, unix))
    }
}

/// [`TimestampPolicy::to_unix`] with the default 2000-2100 window
pub fn to_unix(iso: &str) -> Result<i64, TimestampError> {
    TimestampPolicy::default().to_unix(iso)
}

/// [`TimestampPolicy::to_iso`] with the default 2000-2100 window
pub fn to_iso(unix: i64) -> Result<String, TimestampError> {
    TimestampPolicy::default().to_iso(unix)
}

/// [`TimestampPolicy::normalize`] with the default 2000-2100 window
pub fn normalize(value: &TimestampValue) -> Result<(String, i64), TimestampError> {
    TimestampPolicy::default().normalize(value)
}

fn parse_iso(input: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    let invalid = || TimestampError::InvalidFormat(input.to_string());

    let (body, offset) = split_offset(input).ok_or_else(invalid)?;
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(body, format).ok())
        .ok_or_else(invalid)?;

    offset.from_local_datetime(&naive).single().ok_or_else(invalid)
}

/// Split a recognized offset suffix off the date-time body.
///
/// Anything that is not `Z` or a well-formed numeric offset stays in the body,
/// where the strict date-time parse rejects it.
fn split_offset(input: &str) -> Option<(&str, FixedOffset)> {
    let utc = FixedOffset::east_opt(0)?;

    if let Some(body) = input.strip_suffix('Z') {
        return Some((body, utc));
    }

    // Offsets can only follow the time part; the date part has its own dashes
    let time_start = input.find(['T', ' '])? + 1;
    match input[time_start..].rfind(['+', '-']) {
        None => Some((input, utc)),
        Some(relative) => {
            let sign_index = time_start + relative;
            let offset = parse_offset(&input[sign_index..])?;
            Some((&input[..sign_index], offset))
        }
    }
}

fn parse_offset(suffix: &str) -> Option<FixedOffset> {
    let (sign, rest) = suffix.split_at(1);
    let sign = if sign == "-" { -1 } else { 1 };

    let digits: String = match rest.len() {
        2 | 4 => rest.to_string(),
        5 if rest.as_bytes()[2] == b':' => rest.replacen(':', "", 1),
        _ => return None,
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..4].parse().ok()?
    } else {
        0
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

//! Timestamp parsing and timezone resolution for tool arguments.
//!
//! Models send timestamps in whatever ISO 8601 flavor they like. Anything
//! with an offset goes to the service untouched; wall-clock times are either
//! pinned to UTC (query bounds) or paired with a named zone (event endpoints).

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const NAIVE_RENDER: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("invalid timestamp '{0}', expected ISO 8601 such as 2025-01-15T10:00:00")]
    InvalidTimestamp(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("end time {end} is before start time {start}")]
    EndBeforeStart { start: String, end: String },

    #[error("timestamp '{0}' is out of range")]
    OutOfRange(String),
}

/// An event endpoint as the caller wrote it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTimestamp {
    /// No zone information; interpreted in the event's `timeZone`.
    Local(NaiveDateTime),
    Offset(DateTime<FixedOffset>),
}

impl EventTimestamp {
    /// Parse ISO 8601 with or without an offset. A bare date means midnight.
    pub fn parse(input: &str) -> Result<Self, TimeError> {
        let s = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Offset(dt));
        }
        for format in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, format) {
                return Ok(Self::Offset(dt));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::Local(dt));
            }
        }
        if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(Self::Local(midnight));
        }

        Err(TimeError::InvalidTimestamp(input.to_string()))
    }

    /// Shift by a fixed duration, keeping the representation.
    pub fn shifted(self, by: Duration) -> Result<Self, TimeError> {
        let shifted = match self {
            Self::Local(dt) => dt.checked_add_signed(by).map(Self::Local),
            Self::Offset(dt) => dt.checked_add_signed(by).map(Self::Offset),
        };
        shifted.ok_or_else(|| TimeError::OutOfRange(self.render()))
    }

    pub fn plus_one_hour(self) -> Result<Self, TimeError> {
        self.shifted(Duration::hours(1))
    }

    /// Value for an event `dateTime` field.
    pub fn render(&self) -> String {
        match self {
            Self::Local(dt) => dt.format(NAIVE_RENDER).to_string(),
            Self::Offset(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    /// The instant this denotes when wall-clock times are read in `tz`.
    pub fn instant_in(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            // DST gaps have no local mapping; fall back to reading it as UTC
            Self::Local(dt) => tz
                .from_local_datetime(dt)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| dt.and_utc()),
            Self::Offset(dt) => dt.with_timezone(&Utc),
        }
    }
}

/// Make a query bound acceptable as an RFC 3339 timestamp.
///
/// Offset-bearing input is returned unchanged; wall-clock input is read as UTC.
pub fn normalize_timestamp(input: &str) -> Result<String, TimeError> {
    match EventTimestamp::parse(input)? {
        EventTimestamp::Offset(_) => Ok(input.trim().to_string()),
        EventTimestamp::Local(dt) => Ok(format!("{}Z", dt.format(NAIVE_RENDER))),
    }
}

/// Fail if `end` is earlier than `start`. Equal endpoints are allowed.
pub fn ensure_ordered(
    start: &EventTimestamp,
    end: &EventTimestamp,
    tz: Tz,
) -> Result<(), TimeError> {
    if end.instant_in(tz) < start.instant_in(tz) {
        return Err(TimeError::EndBeforeStart {
            start: start.render(),
            end: end.render(),
        });
    }
    Ok(())
}

/// First of: explicit argument, configured default, host zone.
pub fn resolve_timezone(explicit: Option<&str>, configured: Option<&str>) -> Result<Tz, TimeError> {
    let named = [explicit, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty());

    match named {
        Some(name) => parse_timezone(name),
        None => Ok(host_timezone()),
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, TimeError> {
    name.parse::<Tz>()
        .map_err(|_| TimeError::UnknownTimezone(name.to_string()))
}

/// `TZ`, then the OS setting, then UTC.
pub fn host_timezone() -> Tz {
    if let Ok(value) = std::env::var("TZ") {
        let name = value.trim().trim_start_matches(':');
        if !name.is_empty() {
            match name.parse::<Tz>() {
                Ok(tz) => return tz,
                Err(_) => tracing::warn!("Ignoring unrecognized TZ value '{}'", value),
            }
        }
    }

    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!("Host timezone '{}' is not a known IANA zone, using UTC", name);
            Tz::UTC
        }),
        Err(e) => {
            tracing::debug!("Could not determine host timezone ({}), using UTC", e);
            Tz::UTC
        }
    }
}

/// Current time as RFC 3339 in `tz`.
pub fn now_in(tz: Tz) -> String {
    Utc::now()
        .with_timezone(&tz)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

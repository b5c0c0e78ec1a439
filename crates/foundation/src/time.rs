use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Milliseconds since the Unix epoch (UTC).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

/// A signed span of milliseconds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeDuration(pub i64);

/// Inclusive `[min, max]` window used to filter timestamped paths.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub min: Timestamp,
    pub max: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    Timestamp(String),
    Duration(String),
    CalendarDuration(String),
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeParseError::Timestamp(s) => write!(f, "invalid timestamp: {s:?}"),
            TimeParseError::Duration(s) => write!(f, "invalid ISO-8601 duration: {s:?}"),
            TimeParseError::CalendarDuration(s) => {
                write!(f, "year/month durations are calendar dependent: {s:?}")
            }
        }
    }
}

impl std::error::Error for TimeParseError {}

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn saturating_sub(self, d: TimeDuration) -> Self {
        Self(self.0.saturating_sub(d.0))
    }

    pub fn saturating_add(self, d: TimeDuration) -> Self {
        Self(self.0.saturating_add(d.0))
    }

    /// Parses a calendar timestamp into UTC milliseconds.
    ///
    /// Accepted: RFC 3339, plus `YYYY-MM-DD[(T| )HH:MM[:SS[.fff]]]` with an
    /// optional `Z` or `±HH[:]MM` offset. Times without an offset are UTC.
    pub fn parse_utc(text: &str) -> Result<Self, TimeParseError> {
        let s = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.timestamp_millis()));
        }

        let s = match s.strip_suffix('Z') {
            Some(head) => format!("{head}+00:00"),
            None => s.to_string(),
        }
        .replacen(' ', "T", 1);

        let with_offset = OFFSET_FORMATS
            .iter()
            .find_map(|f| DateTime::parse_from_str(&s, f).ok())
            .map(|dt| dt.timestamp_millis());
        let naive = || {
            NAIVE_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(&s, f).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|dt| dt.and_utc().timestamp_millis())
        };

        with_offset
            .or_else(naive)
            .map(Self)
            .ok_or_else(|| TimeParseError::Timestamp(text.to_string()))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Timestamp(ms)),
            Raw::Text(s) => Timestamp::parse_utc(&s).map_err(serde::de::Error::custom),
        }
    }
}

impl TimeDuration {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_hours(hours: i64) -> Self {
        Self(hours * MS_PER_HOUR)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    /// Parses an ISO-8601 duration such as `PT6H` or `P1DT12H30M`.
    pub fn parse_iso8601(text: &str) -> Result<Self, TimeParseError> {
        let err = || TimeParseError::Duration(text.to_string());
        let s = text.trim();
        let body = s.strip_prefix('P').ok_or_else(err)?;
        if body.is_empty() {
            return Err(err());
        }

        let mut total: i64 = 0;
        let mut in_time = false;
        let mut number = String::new();
        let mut saw_component = false;

        for c in body.chars() {
            match c {
                '0'..='9' | '.' => number.push(c),
                'T' if !in_time && number.is_empty() => in_time = true,
                unit => {
                    let value: f64 = number.parse().map_err(|_| err())?;
                    number.clear();
                    let scale = match (in_time, unit) {
                        (false, 'W') => 7 * MS_PER_DAY,
                        (false, 'D') => MS_PER_DAY,
                        (false, 'Y') | (false, 'M') => {
                            return Err(TimeParseError::CalendarDuration(text.to_string()));
                        }
                        (true, 'H') => MS_PER_HOUR,
                        (true, 'M') => MS_PER_MINUTE,
                        (true, 'S') => MS_PER_SECOND,
                        _ => return Err(err()),
                    };
                    let part = (value * scale as f64).round();
                    if part >= i64::MAX as f64 {
                        return Err(err());
                    }
                    total = total.checked_add(part as i64).ok_or_else(err)?;
                    saw_component = true;
                }
            }
        }

        if !number.is_empty() || !saw_component {
            return Err(err());
        }
        Ok(Self(total))
    }
}

impl TimeWindow {
    pub fn new(min: Timestamp, max: Timestamp) -> Self {
        Self { min, max }
    }

    /// Window ending at `current`, reaching back by `duration`.
    ///
    /// Without a duration the window is unbounded in the past.
    pub fn trailing(current: Timestamp, duration: Option<TimeDuration>) -> Self {
        let min = match duration {
            Some(d) => current.saturating_sub(d),
            None => Timestamp(i64::MIN),
        };
        Self { min, max: current }
    }

    /// Window from `current` up to the end of a retrospective run.
    pub fn retrospective(current: Timestamp, dataset_max: Timestamp) -> Self {
        Self {
            min: current,
            max: dataset_max,
        }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.min <= t && t <= self.max
    }
}

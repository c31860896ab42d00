//! The interval model: a dated, timezone-resolved time range in one mode.
//!
//! Pure values with no behavior beyond construction and comparison. Overlap
//! rules live in [`crate::conflict`].

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ScheduleError;
use crate::temporal::{format_hhmm, localize, parse_time_string};

// ── Mode ────────────────────────────────────────────────────────────────────

/// How a session is delivered. A guide's calendar is shared across modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Remote,
    InPerson,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Remote => write!(f, "remote"),
            Mode::InPerson => write!(f, "in-person"),
        }
    }
}

// ── LocalTimeRange ──────────────────────────────────────────────────────────

/// Wire form of a local time range, e.g. `{"start": "09:00", "end": "10:00"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeInput {
    pub start: String,
    pub end: String,
}

/// A wall-clock time range within one day. Always `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "TimeRangeInput", into = "TimeRangeInput")]
pub struct LocalTimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl LocalTimeRange {
    /// # Errors
    ///
    /// Returns [`ScheduleError::Validation`] if `start >= end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::Validation(format!(
                "time range {}-{} must start before it ends",
                format_hhmm(start),
                format_hhmm(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a pair of time strings (`"09:00"`, `"2:30pm"`, ...).
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        let parse = |s: &str| {
            parse_time_string(s)
                .ok_or_else(|| ScheduleError::Validation(format!("invalid time of day '{s}'")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

impl fmt::Display for LocalTimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

impl TryFrom<TimeRangeInput> for LocalTimeRange {
    type Error = ScheduleError;

    fn try_from(input: TimeRangeInput) -> Result<Self, Self::Error> {
        Self::parse(&input.start, &input.end)
    }
}

impl From<LocalTimeRange> for TimeRangeInput {
    fn from(range: LocalTimeRange) -> Self {
        Self {
            start: format_hhmm(range.start),
            end: format_hhmm(range.end),
        }
    }
}

// ── Interval ────────────────────────────────────────────────────────────────

/// A concrete dated interval, localized in the guide's timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub mode: Mode,
    /// Guide-local calendar date.
    pub calendar_date: NaiveDate,
    pub local_time: LocalTimeRange,
    pub utc_start: DateTime<Utc>,
    pub utc_end: DateTime<Utc>,
    pub timezone: Tz,
}

impl Interval {
    /// Resolve `date` + `local_time` in `timezone` to absolute instants.
    pub fn localize(
        mode: Mode,
        date: NaiveDate,
        local_time: LocalTimeRange,
        timezone: Tz,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            mode,
            calendar_date: date,
            local_time,
            utc_start: localize(date, local_time.start(), timezone)?,
            utc_end: localize(date, local_time.end(), timezone)?,
            timezone,
        })
    }

    pub fn day_of_week(&self) -> Weekday {
        self.calendar_date.weekday()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.calendar_date, self.local_time, self.mode)
    }
}

/// An interval produced by expansion or supplied explicitly, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub interval: Interval,
    pub capacity: u32,
    /// Price in minor currency units.
    pub price: u64,
}

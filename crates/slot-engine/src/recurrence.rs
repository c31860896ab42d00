//! Strongly-typed recurrence input, validated once at the boundary.
//!
//! Requests arrive as loosely-typed wire structs ([`RecurrenceInput`],
//! [`ScheduleSpecInput`]) holding plain strings. Converting them into
//! [`RecurrenceSpec`] / [`ScheduleSpec`] performs every check the expander
//! relies on, so an expander input is valid by construction:
//!
//! - at least one weekday, every name recognised
//! - `date_range.start <= date_range.end`
//! - at least one local time range, each with `start < end`
//! - a known IANA timezone
//!
//! Violations are reported as [`ScheduleError::Validation`] (or
//! [`ScheduleError::InvalidTimezone`]) before any slot store is read.

use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ScheduleError;
use crate::interval::{LocalTimeRange, Mode, TimeRangeInput};
use crate::temporal::{parse_timezone, parse_weekday, weekday_name};

/// Per-mode recurrence specs, ordered by mode.
pub type ModeSpecs = BTreeMap<Mode, RecurrenceSpec>;

// ── WeekdaySet ──────────────────────────────────────────────────────────────

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// A set of weekdays stored as a bitmask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.into_iter().filter(|d| self.contains(*d))
    }

    /// Full weekday names in Monday-first order.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|d| weekday_name(d).to_string()).collect()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::default();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

// ── DateRange ───────────────────────────────────────────────────────────────

/// An inclusive range of guide-local calendar dates. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ScheduleError> {
        if start > end {
            return Err(ScheduleError::Validation(format!(
                "date range {start}..{end} ends before it starts"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ── RecurrenceSpec ──────────────────────────────────────────────────────────

/// Wire form of a date range: ISO dates as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeInput {
    pub start: String,
    pub end: String,
}

/// Wire form of one mode's recurrence pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceInput {
    pub selected_weekdays: Vec<String>,
    pub date_range: DateRangeInput,
    pub local_time_ranges: Vec<TimeRangeInput>,
}

/// A validated weekday + date-range + local-time-ranges pattern for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecurrenceInput", into = "RecurrenceInput")]
pub struct RecurrenceSpec {
    weekdays: WeekdaySet,
    date_range: DateRange,
    time_ranges: Vec<LocalTimeRange>,
}

impl RecurrenceSpec {
    pub fn new(
        weekdays: WeekdaySet,
        date_range: DateRange,
        time_ranges: Vec<LocalTimeRange>,
    ) -> Result<Self, ScheduleError> {
        if weekdays.is_empty() {
            return Err(ScheduleError::Validation(
                "at least one weekday must be selected".to_string(),
            ));
        }
        if time_ranges.is_empty() {
            return Err(ScheduleError::Validation(
                "at least one local time range is required".to_string(),
            ));
        }
        Ok(Self {
            weekdays,
            date_range,
            time_ranges,
        })
    }

    pub fn weekdays(&self) -> WeekdaySet {
        self.weekdays
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn time_ranges(&self) -> &[LocalTimeRange] {
        &self.time_ranges
    }

    /// Whether a slot on `date` covering `range` is one this pattern would produce.
    pub fn produces(&self, date: NaiveDate, range: &LocalTimeRange) -> bool {
        self.date_range.contains(date)
            && self.weekdays.contains(date.weekday())
            && self.time_ranges.contains(range)
    }
}

impl TryFrom<RecurrenceInput> for RecurrenceSpec {
    type Error = ScheduleError;

    fn try_from(input: RecurrenceInput) -> Result<Self, Self::Error> {
        let mut weekdays = WeekdaySet::default();
        for name in &input.selected_weekdays {
            let day = parse_weekday(name)
                .ok_or_else(|| ScheduleError::Validation(format!("unknown weekday '{name}'")))?;
            weekdays.insert(day);
        }

        let date_range = DateRange::new(
            parse_iso_date(&input.date_range.start)?,
            parse_iso_date(&input.date_range.end)?,
        )?;

        let time_ranges = input
            .local_time_ranges
            .into_iter()
            .map(LocalTimeRange::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(weekdays, date_range, time_ranges)
    }
}

impl From<RecurrenceSpec> for RecurrenceInput {
    fn from(spec: RecurrenceSpec) -> Self {
        Self {
            selected_weekdays: spec.weekdays.names(),
            date_range: DateRangeInput {
                start: spec.date_range.start.to_string(),
                end: spec.date_range.end.to_string(),
            },
            local_time_ranges: spec.time_ranges.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for RecurrenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranges: Vec<String> = self.time_ranges.iter().map(|r| r.to_string()).collect();
        write!(
            f,
            "{} from {} to {} at {}",
            self.weekdays,
            self.date_range.start,
            self.date_range.end,
            ranges.join(", ")
        )
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ScheduleError::Validation(format!("invalid date '{s}': {e}")))
}

// ── ScheduleSpec ────────────────────────────────────────────────────────────

/// Wire form of a full schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpecInput {
    pub timezone: String,
    pub modes: BTreeMap<Mode, RecurrenceInput>,
}

/// Per-mode recurrence specs plus the guide timezone they are interpreted in.
///
/// This is the snapshot a generation job stores verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleSpecInput", into = "ScheduleSpecInput")]
pub struct ScheduleSpec {
    pub timezone: Tz,
    pub modes: ModeSpecs,
}

impl TryFrom<ScheduleSpecInput> for ScheduleSpec {
    type Error = ScheduleError;

    fn try_from(input: ScheduleSpecInput) -> Result<Self, Self::Error> {
        let timezone = parse_timezone(&input.timezone)?;
        if input.modes.is_empty() {
            return Err(ScheduleError::Validation(
                "at least one mode must be scheduled".to_string(),
            ));
        }
        let modes = input
            .modes
            .into_iter()
            .map(|(mode, raw)| {
                RecurrenceSpec::try_from(raw)
                    .map(|spec| (mode, spec))
                    .map_err(|e| match e {
                        ScheduleError::Validation(msg) => {
                            ScheduleError::Validation(format!("{mode}: {msg}"))
                        }
                        other => other,
                    })
            })
            .collect::<Result<ModeSpecs, _>>()?;
        Ok(Self { timezone, modes })
    }
}

impl From<ScheduleSpec> for ScheduleSpecInput {
    fn from(spec: ScheduleSpec) -> Self {
        Self {
            timezone: spec.timezone.name().to_string(),
            modes: spec
                .modes
                .into_iter()
                .map(|(mode, s)| (mode, s.into()))
                .collect(),
        }
    }
}

//! Recurrence spec → list of concrete, timezone-resolved candidate intervals.
//!
//! Expansion walks every calendar day of the spec's date range inclusive,
//! keeps the days whose weekday is selected, and emits one interval per local
//! time range on each kept day. UTC instants are computed per day, so a pattern
//! spanning a DST change keeps its wall-clock times (see [`crate::temporal`]).
//!
//! Modes are expanded independently; a schedule's candidate list is the union
//! of its modes' expansions, ordered by mode, then date, then time range.

use chrono::Datelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::interval::{Candidate, Interval, LocalTimeRange, Mode};
use crate::offering::Offering;
use crate::recurrence::{parse_iso_date, ModeSpecs, RecurrenceSpec};

/// Expand one mode's pattern into intervals localized in `timezone`.
///
/// A pattern whose weekdays never fall inside its date range yields an empty list.
pub fn expand(
    spec: &RecurrenceSpec,
    mode: Mode,
    timezone: Tz,
) -> Result<Vec<Interval>, ScheduleError> {
    let weekdays = spec.weekdays();
    let mut intervals = Vec::new();

    for day in spec
        .date_range()
        .days()
        .filter(|d| weekdays.contains(d.weekday()))
    {
        for range in spec.time_ranges() {
            intervals.push(Interval::localize(mode, day, *range, timezone)?);
        }
    }

    Ok(intervals)
}

/// Number of intervals [`expand`] would produce, without localizing them.
pub fn expansion_size(spec: &RecurrenceSpec) -> usize {
    let weekdays = spec.weekdays();
    let days = spec
        .date_range()
        .days()
        .filter(|d| weekdays.contains(d.weekday()))
        .count();
    days * spec.time_ranges().len()
}

/// Expand every mode of `specs` for `offering`, attaching each mode's capacity and price.
///
/// # Errors
///
/// Returns [`ScheduleError::Validation`] if a mode is not enabled on the offering,
/// or if the total would exceed `max_candidates`.
pub fn expand_for_offering(
    offering: &Offering,
    specs: &ModeSpecs,
    max_candidates: usize,
) -> Result<Vec<Candidate>, ScheduleError> {
    offering.check_modes(specs)?;

    let total: usize = specs.values().map(expansion_size).sum();
    if total > max_candidates {
        return Err(ScheduleError::Validation(format!(
            "pattern expands to {total} slots, more than the limit of {max_candidates}"
        )));
    }

    let mut candidates = Vec::with_capacity(total);
    for (mode, spec) in specs {
        let config = offering.enabled_mode(*mode)?;
        candidates.extend(
            expand(spec, *mode, offering.timezone)?
                .into_iter()
                .map(|interval| Candidate {
                    interval,
                    capacity: config.capacity,
                    price: config.price,
                }),
        );
    }

    Ok(candidates)
}

// ── Explicit (ad-hoc) slots ─────────────────────────────────────────────────

/// Wire form of one explicitly requested slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitSlot {
    pub date: String,
    pub start: String,
    pub end: String,
}

impl ExplicitSlot {
    pub fn new(date: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Localize caller-supplied slots for one mode of `offering`.
///
/// Every entry is validated before any is localized; an empty list is invalid.
pub fn explicit_candidates(
    offering: &Offering,
    mode: Mode,
    slots: &[ExplicitSlot],
) -> Result<Vec<Candidate>, ScheduleError> {
    let config = offering.enabled_mode(mode)?;
    if slots.is_empty() {
        return Err(ScheduleError::Validation(
            "at least one slot is required".to_string(),
        ));
    }

    let parsed = slots
        .iter()
        .map(|s| -> Result<_, ScheduleError> {
            Ok((parse_iso_date(&s.date)?, LocalTimeRange::parse(&s.start, &s.end)?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    parsed
        .into_iter()
        .map(|(date, range)| -> Result<Candidate, ScheduleError> {
            Ok(Candidate {
                interval: Interval::localize(mode, date, range, offering.timezone)?,
                capacity: config.capacity,
                price: config.price,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::GuideId;
    use crate::recurrence::{DateRange, WeekdaySet};
    use chrono::{NaiveDate, TimeZone, Utc, Weekday};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn spec(days: &[Weekday], start: NaiveDate, end: NaiveDate, ranges: &[(&str, &str)]) -> RecurrenceSpec {
        RecurrenceSpec::new(
            days.iter().copied().collect(),
            DateRange::new(start, end).unwrap(),
            ranges
                .iter()
                .map(|(s, e)| LocalTimeRange::parse(s, e).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn wednesdays_in_kolkata_resolve_to_0330_utc() {
        let s = spec(&[Weekday::Wed], date(2025, 1, 1), date(2025, 1, 31), &[("09:00", "10:00")]);
        let intervals = expand(&s, Mode::Remote, Tz::Asia__Kolkata).unwrap();

        let dates: Vec<NaiveDate> = intervals.iter().map(|i| i.calendar_date).collect();
        assert_eq!(
            dates,
            vec![
                date(2025, 1, 1),
                date(2025, 1, 8),
                date(2025, 1, 15),
                date(2025, 1, 22),
                date(2025, 1, 29)
            ]
        );
        for interval in &intervals {
            assert_eq!(interval.day_of_week(), Weekday::Wed);
            let d = interval.calendar_date;
            assert_eq!(
                interval.utc_start,
                Utc.with_ymd_and_hms(d.year(), d.month(), d.day(), 3, 30, 0).unwrap()
            );
        }
    }

    #[test]
    fn multiple_ranges_per_day_in_order() {
        let s = spec(
            &[Weekday::Mon],
            date(2025, 1, 6),
            date(2025, 1, 6),
            &[("09:00", "10:00"), ("14:00", "15:00")],
        );
        let intervals = expand(&s, Mode::InPerson, Tz::UTC).unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].local_time.to_string(), "09:00-10:00");
        assert_eq!(intervals[1].local_time.to_string(), "14:00-15:00");
        assert!(intervals.iter().all(|i| i.mode == Mode::InPerson));
    }

    #[test]
    fn weekday_outside_range_yields_nothing() {
        // Jan 6-10 2025 runs Monday to Friday, so no Sunday falls inside
        let s = spec(&[Weekday::Sun], date(2025, 1, 6), date(2025, 1, 10), &[("09:00", "10:00")]);
        assert!(expand(&s, Mode::Remote, Tz::UTC).unwrap().is_empty());
        assert_eq!(expansion_size(&s), 0);
    }

    #[test]
    fn wall_clock_held_across_dst() {
        // Sundays around the March 8 2026 US transition
        let s = spec(&[Weekday::Sun], date(2026, 3, 1), date(2026, 3, 15), &[("09:00", "10:00")]);
        let intervals = expand(&s, Mode::Remote, Tz::America__New_York).unwrap();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].utc_start, Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap());
        assert_eq!(intervals[1].utc_start, Utc.with_ymd_and_hms(2026, 3, 8, 13, 0, 0).unwrap());
        assert_eq!(intervals[2].utc_start, Utc.with_ymd_and_hms(2026, 3, 15, 13, 0, 0).unwrap());
    }

    #[test]
    fn offering_expansion_attaches_mode_pricing() {
        let offering = Offering::new(GuideId::new(), "Yoga", Tz::UTC)
            .with_mode(Mode::Remote, 10, 1500)
            .unwrap()
            .with_mode(Mode::InPerson, 4, 3000)
            .unwrap();
        let mut specs = BTreeMap::new();
        specs.insert(
            Mode::Remote,
            spec(&[Weekday::Mon], date(2025, 1, 6), date(2025, 1, 13), &[("09:00", "10:00")]),
        );
        specs.insert(
            Mode::InPerson,
            spec(&[Weekday::Tue], date(2025, 1, 1), date(2025, 1, 7), &[("18:00", "19:00")]),
        );

        let candidates = expand_for_offering(&offering, &specs, 100).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].interval.mode, Mode::Remote);
        assert_eq!(candidates[0].capacity, 10);
        assert_eq!(candidates[2].interval.mode, Mode::InPerson);
        assert_eq!(candidates[2].price, 3000);
    }

    #[test]
    fn offering_expansion_rejects_disabled_mode_and_cap() {
        let offering = Offering::new(GuideId::new(), "Yoga", Tz::UTC)
            .with_mode(Mode::Remote, 10, 1500)
            .unwrap();
        let s = spec(&[Weekday::Mon], date(2025, 1, 1), date(2025, 3, 31), &[("09:00", "10:00")]);

        let mut in_person = BTreeMap::new();
        in_person.insert(Mode::InPerson, s.clone());
        assert!(matches!(
            expand_for_offering(&offering, &in_person, 100),
            Err(ScheduleError::Validation(_))
        ));

        let mut remote = BTreeMap::new();
        remote.insert(Mode::Remote, s);
        let err = expand_for_offering(&offering, &remote, 5).unwrap_err();
        assert!(err.to_string().contains("limit of 5"), "got: {err}");
    }

    #[test]
    fn explicit_slots_validated_before_localizing() {
        let offering = Offering::new(GuideId::new(), "Yoga", Tz::Asia__Kolkata)
            .with_mode(Mode::Remote, 10, 1500)
            .unwrap();

        let ok = explicit_candidates(
            &offering,
            Mode::Remote,
            &[ExplicitSlot::new("2025-01-02", "09:00", "10:00")],
        )
        .unwrap();
        assert_eq!(ok[0].interval.utc_start, Utc.with_ymd_and_hms(2025, 1, 2, 3, 30, 0).unwrap());

        assert!(explicit_candidates(&offering, Mode::Remote, &[]).is_err());
        assert!(explicit_candidates(
            &offering,
            Mode::Remote,
            &[
                ExplicitSlot::new("2025-01-02", "09:00", "10:00"),
                ExplicitSlot::new("2025-13-02", "09:00", "10:00"),
            ],
        )
        .is_err());
        assert!(explicit_candidates(
            &offering,
            Mode::InPerson,
            &[ExplicitSlot::new("2025-01-02", "09:00", "10:00")],
        )
        .is_err());
    }

    #[test]
    fn weekday_set_collects() {
        let set: WeekdaySet = [Weekday::Fri, Weekday::Mon].into_iter().collect();
        assert_eq!(set.names(), vec!["Monday", "Friday"]);
    }
}

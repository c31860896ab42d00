//! Timezone and wall-clock helpers shared by the expander and the validators.
//!
//! All functions take explicit inputs (no system clock access); the caller
//! provides the "now" anchor when needed, keeping these functions
//! deterministic and testable.
//!
//! # Functions
//!
//! - [`parse_timezone`] — IANA name → [`Tz`]
//! - [`localize`] — calendar date + local time in a timezone → UTC instant
//! - [`local_today`] — the guide-local calendar date of an instant
//! - [`add_months`] — calendar-month arithmetic clamped to month end
//! - [`parse_weekday`] / [`weekday_name`] — weekday names in both directions
//! - [`parse_time_string`] / [`format_hhmm`] — local time-of-day in both directions
//!
//! # DST policy
//!
//! A local time that does not exist (spring-forward gap) is shifted forward by
//! the length of the gap, so `02:30` on a `02:00 → 03:00` transition day
//! resolves to `03:30` local. A local time that occurs twice (fall-back
//! overlap) resolves to the earlier instant.

use chrono::{
    DateTime, Duration, LocalResult, Months, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

use crate::error::ScheduleError;

/// How far before a DST gap we probe to read the pre-transition offset.
/// Every real-world gap is shorter than this.
const DST_PROBE_HOURS: i64 = 6;

// ── Timezones ───────────────────────────────────────────────────────────────

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz, ScheduleError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(format!("'{}'", s)))
}

/// Interpret `date` + `time` as wall-clock time in `tz` and return the UTC instant.
///
/// See the module docs for how DST gaps and overlaps are resolved.
///
/// # Errors
///
/// Returns [`ScheduleError::Validation`] only if the timezone database cannot
/// resolve the wall-clock time even after the gap shift (no known zone does this).
pub fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Utc>, ScheduleError> {
    let naive = date.and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Inside a gap: apply the offset in force just before the transition.
            let probe = naive - Duration::hours(DST_PROBE_HOURS);
            let before = tz.from_local_datetime(&probe).earliest().ok_or_else(|| {
                ScheduleError::Validation(format!(
                    "local time {} {} cannot be resolved in {}",
                    date,
                    format_hhmm(time),
                    tz.name()
                ))
            })?;
            let offset_secs = before.offset().fix().local_minus_utc() as i64;
            Ok(Utc.from_utc_datetime(&(naive - Duration::seconds(offset_secs))))
        }
    }
}

/// The calendar date of `instant` as seen in `tz`.
pub fn local_today(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Add calendar months to a date, clamping to the last day of the target month
/// (Aug 31 + 6 months = Feb 28/29).
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, ScheduleError> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| ScheduleError::Range(format!("{} + {} months overflows", date, months)))
}

// ── Weekdays ────────────────────────────────────────────────────────────────

/// Parse a weekday name (case-insensitive, supports full and abbreviated).
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Full English name of a weekday ("Wednesday").
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

// ── Time of day ─────────────────────────────────────────────────────────────

/// Parse a time string: "14:00", "14:30:00", "2pm", "2:30pm", "9 am".
pub fn parse_time_string(s: &str) -> Option<NaiveTime> {
    let s = s.trim().to_ascii_lowercase();

    // 24-hour format: "14:00", "14:30", "14:30:00"
    if let Ok(t) = NaiveTime::parse_from_str(&s, "%H:%M:%S") {
        return Some(t);
    }
    if let Ok(t) = NaiveTime::parse_from_str(&s, "%H:%M") {
        return Some(t);
    }

    // 12-hour format: "2pm", "2:30pm", "2 pm"
    let s_no_space = s.replace(' ', "");
    let (time_part, is_pm) = if let Some(rest) = s_no_space.strip_suffix("pm") {
        (rest, true)
    } else if let Some(rest) = s_no_space.strip_suffix("am") {
        (rest, false)
    } else {
        return None;
    };

    let parts: Vec<&str> = time_part.split(':').collect();
    let hour: u32 = parts.first()?.parse().ok()?;
    let minute: u32 = match parts.get(1) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour24 = match (hour, is_pm) {
        (12, true) => 12,
        (12, false) => 0,
        (h, true) => h + 12,
        (h, false) => h,
    };

    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// Render a local time as `"HH:MM"`.
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // ── parse_timezone ──────────────────────────────────────────────────

    #[test]
    fn test_parse_timezone_valid() {
        assert_eq!(parse_timezone("Asia/Kolkata").unwrap(), Tz::Asia__Kolkata);
    }

    #[test]
    fn test_parse_timezone_invalid() {
        let err = parse_timezone("Mars/Olympus").unwrap_err().to_string();
        assert!(err.contains("Invalid timezone"), "got: {err}");
    }

    // ── localize ────────────────────────────────────────────────────────

    #[test]
    fn test_localize_fixed_offset_zone() {
        // Kolkata is UTC+05:30 year round
        let utc = localize(date(2025, 1, 1), time(9, 0), Tz::Asia__Kolkata).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2025, 1, 1, 3, 30, 0).unwrap());
    }

    #[test]
    fn test_localize_tracks_dst() {
        // New York: EST (-5) in January, EDT (-4) in July
        let winter = localize(date(2026, 1, 15), time(9, 0), Tz::America__New_York).unwrap();
        let summer = localize(date(2026, 7, 15), time(9, 0), Tz::America__New_York).unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap());
        assert_eq!(summer, Utc.with_ymd_and_hms(2026, 7, 15, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_localize_spring_forward_gap_shifts_forward() {
        // March 8, 2026: 02:00 → 03:00 in New York. 02:30 does not exist.
        let utc = localize(date(2026, 3, 8), time(2, 30), Tz::America__New_York).unwrap();
        // Shifted to 03:30 EDT = 07:30 UTC
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_localize_fall_back_takes_earlier() {
        // November 1, 2026: 01:30 happens twice in New York; take EDT (-4).
        let utc = localize(date(2026, 11, 1), time(1, 30), Tz::America__New_York).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap());
    }

    // ── add_months / local_today ────────────────────────────────────────

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months(date(2026, 8, 31), 6).unwrap(), date(2027, 2, 28));
        assert_eq!(add_months(date(2026, 1, 15), 6).unwrap(), date(2026, 7, 15));
    }

    #[test]
    fn test_local_today_crosses_date_line() {
        // 20:00 UTC on Jan 1 is already Jan 2 in Kolkata
        let instant = Utc.with_ymd_and_hms(2026, 1, 1, 20, 0, 0).unwrap();
        assert_eq!(local_today(instant, Tz::Asia__Kolkata), date(2026, 1, 2));
        assert_eq!(local_today(instant, Tz::UTC), date(2026, 1, 1));
    }

    // ── weekdays ────────────────────────────────────────────────────────

    #[test]
    fn test_parse_weekday_variants() {
        assert_eq!(parse_weekday("Wednesday"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("wed"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("  THURS "), Some(Weekday::Thu));
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn test_weekday_name_round_trips() {
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ] {
            assert_eq!(parse_weekday(weekday_name(day)), Some(day));
        }
    }

    // ── time strings ────────────────────────────────────────────────────

    #[test]
    fn test_parse_time_24h() {
        assert_eq!(parse_time_string("09:00"), Some(time(9, 0)));
        assert_eq!(parse_time_string("14:30:00"), Some(time(14, 30)));
    }

    #[test]
    fn test_parse_time_12h() {
        assert_eq!(parse_time_string("2pm"), Some(time(14, 0)));
        assert_eq!(parse_time_string("2:30 PM"), Some(time(14, 30)));
        assert_eq!(parse_time_string("12am"), Some(time(0, 0)));
        assert_eq!(parse_time_string("12pm"), Some(time(12, 0)));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert_eq!(parse_time_string("25:00"), None);
        assert_eq!(parse_time_string("13pm"), None);
        assert_eq!(parse_time_string("noonish"), None);
        assert_eq!(parse_time_string(""), None);
    }

    #[test]
    fn test_format_hhmm() {
        assert_eq!(format_hhmm(time(9, 5)), "09:05");
    }
}

//! Rules for extending a recurring schedule.
//!
//! A new recurring extension must start strictly after everything already
//! scheduled for the offering:
//!
//! ```text
//! earliest_allowed_start = max(original_pattern_end, latest_slot_date) + 1 day
//! ```
//!
//! and must end no later than the horizon cap (`today + N months`, guide-local).
//!
//! Existing slots are also classified as coming from the original pattern or
//! as individually added. The classification is reporting only; it is never
//! used to enforce anything.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::interval::Mode;
use crate::offering::Offering;
use crate::recurrence::{DateRange, ModeSpecs};
use crate::slot::Slot;
use crate::temporal::{add_months, local_today};

/// The dates a new extension may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionWindow {
    pub earliest_allowed_start: NaiveDate,
    /// Last date an extension may reach.
    pub cap: NaiveDate,
}

impl ExtensionWindow {
    /// Whether any date is still available to extend into.
    pub fn is_open(&self) -> bool {
        self.earliest_allowed_start <= self.cap
    }
}

/// The last date already committed: original pattern end or latest slot, whichever is later.
pub fn scheduled_through(offering: &Offering, history: &[Slot]) -> Option<NaiveDate> {
    let latest_slot = history.iter().map(|s| s.interval.calendar_date).max();
    offering.original_pattern_end().max(latest_slot)
}

/// Compute the extension window for `offering` given its full slot history.
///
/// With no pattern and no slots the window starts on the guide-local today.
pub fn extension_window(
    offering: &Offering,
    history: &[Slot],
    now: DateTime<Utc>,
    horizon_months: u32,
) -> Result<ExtensionWindow, ScheduleError> {
    let today = local_today(now, offering.timezone);
    let earliest_allowed_start = match scheduled_through(offering, history) {
        Some(last) => last
            .succ_opt()
            .ok_or_else(|| ScheduleError::Range(format!("no date follows {last}")))?,
        None => today,
    };
    Ok(ExtensionWindow {
        earliest_allowed_start,
        cap: add_months(today, horizon_months)?,
    })
}

/// Check an extension request against the offering and the window.
///
/// Each mode is checked independently; extending only one of two enabled
/// modes is allowed.
///
/// # Errors
///
/// - [`ScheduleError::State`] if the offering is not active
/// - [`ScheduleError::Validation`] if a named mode is not enabled, or none is named
/// - [`ScheduleError::Range`] if a mode starts before the window or ends after the cap
pub fn validate_extension(
    offering: &Offering,
    specs: &ModeSpecs,
    window: &ExtensionWindow,
) -> Result<(), ScheduleError> {
    if !offering.is_active() {
        return Err(ScheduleError::State(format!(
            "offering {} is not active and cannot be extended",
            offering.id
        )));
    }
    offering.check_modes(specs)?;

    for (mode, spec) in specs {
        let range = spec.date_range();
        if range.start < window.earliest_allowed_start {
            return Err(ScheduleError::Range(format!(
                "{mode} extension starts {}, but must start on or after {}",
                range.start, window.earliest_allowed_start
            )));
        }
        if range.end > window.cap {
            return Err(ScheduleError::Range(format!(
                "{mode} extension ends {}, past the scheduling limit of {}",
                range.end, window.cap
            )));
        }
    }
    Ok(())
}

// ── Classification ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOrigin {
    OriginalPattern,
    IndividuallyAdded,
}

/// Where `slot` came from, judged against the offering's stored pattern for its mode.
///
/// A slot is from the original pattern only if its date is inside the
/// pattern's range, its weekday is selected, and its local time range equals
/// one of the pattern's entries.
pub fn classify_slot(offering: &Offering, slot: &Slot) -> SlotOrigin {
    let interval = &slot.interval;
    let from_pattern = offering
        .modes
        .get(&interval.mode)
        .and_then(|config| config.recurrence.as_ref())
        .is_some_and(|spec| spec.produces(interval.calendar_date, &interval.local_time));

    if from_pattern {
        SlotOrigin::OriginalPattern
    } else {
        SlotOrigin::IndividuallyAdded
    }
}

/// Slots split by origin, each side in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotClassification {
    pub from_pattern: Vec<Slot>,
    pub individually_added: Vec<Slot>,
}

/// Split the offering's active slots by origin.
///
/// Cancelled slots are not on the schedule and are left out of the report;
/// [`classify_slot`] still judges any single slot, cancelled or not. Cancelled
/// slots do count toward the extension window (see [`extension_window`]).
pub fn classify_slots(offering: &Offering, slots: &[Slot]) -> SlotClassification {
    let mut classification = SlotClassification::default();
    for slot in slots.iter().filter(|s| s.active) {
        match classify_slot(offering, slot) {
            SlotOrigin::OriginalPattern => classification.from_pattern.push(slot.clone()),
            SlotOrigin::IndividuallyAdded => classification.individually_added.push(slot.clone()),
        }
    }
    classification
}

// ── Operator report ─────────────────────────────────────────────────────────

/// The stored original pattern of one mode, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub mode: Mode,
    pub weekdays: Vec<String>,
    pub date_range: DateRange,
    pub time_ranges: Vec<String>,
    /// Active slots that this pattern accounts for.
    pub slot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub earliest_allowed_start: NaiveDate,
    pub cap: NaiveDate,
    pub original_pattern: Vec<PatternSummary>,
    pub individually_added: Vec<Slot>,
    pub suggestion: String,
}

/// Everything an operator needs to plan the next extension.
pub fn extension_info(
    offering: &Offering,
    history: &[Slot],
    now: DateTime<Utc>,
    horizon_months: u32,
) -> Result<ExtensionInfo, ScheduleError> {
    let window = extension_window(offering, history, now, horizon_months)?;
    let classification = classify_slots(offering, history);

    let original_pattern = offering
        .original_patterns()
        .map(|(mode, spec)| PatternSummary {
            mode,
            weekdays: spec.weekdays().names(),
            date_range: spec.date_range(),
            time_ranges: spec.time_ranges().iter().map(|r| r.to_string()).collect(),
            slot_count: classification
                .from_pattern
                .iter()
                .filter(|s| s.interval.mode == mode)
                .count(),
        })
        .collect();

    let suggestion = suggest(&window, classification.individually_added.len(), horizon_months);

    Ok(ExtensionInfo {
        earliest_allowed_start: window.earliest_allowed_start,
        cap: window.cap,
        original_pattern,
        individually_added: classification.individually_added,
        suggestion,
    })
}

fn suggest(window: &ExtensionWindow, individually_added: usize, horizon_months: u32) -> String {
    if !window.is_open() {
        return format!(
            "No extension is possible yet: the schedule already runs past {}, the {}-month scheduling limit.",
            window.cap, horizon_months
        );
    }

    let mut text = format!(
        "Extend with a start date on or after {} and an end date no later than {}.",
        window.earliest_allowed_start, window.cap
    );
    if individually_added > 0 {
        text.push_str(&format!(
            " {individually_added} individually added slot(s) are counted when computing the start date."
        ));
    }
    text
}

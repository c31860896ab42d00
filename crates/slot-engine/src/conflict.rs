//! Detect overlapping intervals on a guide's calendar.
//!
//! Conflict scope is the guide's whole calendar: any offering, any mode,
//! any timezone. Two intervals overlap when
//! `a.utc_start < b.utc_end && a.utc_end > b.utc_start`.
//! Adjacent intervals (where one ends exactly when another starts) are NOT
//! conflicts; back-to-back sessions are legal.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::interval::{Candidate, Interval, Mode};
use crate::slot::Slot;

/// Which side the colliding interval came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Against an already-published slot.
    External,
    /// Against another candidate in the same request.
    IntraBatch,
}

/// A detected collision, with enough text to render a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub calendar_date: NaiveDate,
    /// The candidate's local time range, e.g. `"10:00-11:00"`.
    pub time_range: String,
    pub mode: Mode,
    pub conflicting_with: String,
    pub conflict_type: ConflictType,
    pub overlap_minutes: i64,
}

/// Whether two intervals overlap. Adjacency is not overlap.
///
/// Judged on UTC instants, so intervals localized in different timezones
/// compare correctly. Within one timezone an overlap implies the same local date.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.utc_start < b.utc_end && a.utc_end > b.utc_start
}

fn overlap_minutes(a: &Interval, b: &Interval) -> i64 {
    let start = a.utc_start.max(b.utc_start);
    let end = a.utc_end.min(b.utc_end);
    (end - start).num_minutes()
}

/// Find every conflict of `candidates` against `existing` and against each other.
///
/// `existing` should be the guide's slots (any offering, any timezone); inactive
/// slots are ignored.
///
/// Two passes, in this order:
/// 1. **external** — each candidate against each active existing slot near it in UTC
/// 2. **intra-batch** — each pair of candidates, reported once per pair in input order
///
/// Returns an empty list when clean.
pub fn find_conflicts(candidates: &[Candidate], existing: &[Slot]) -> Vec<ConflictRecord> {
    let mut conflicts = Vec::new();

    let mut existing_by_utc_date: BTreeMap<NaiveDate, Vec<&Slot>> = BTreeMap::new();
    for slot in existing.iter().filter(|s| s.active) {
        existing_by_utc_date
            .entry(slot.interval.utc_start.date_naive())
            .or_default()
            .push(slot);
    }

    for candidate in candidates {
        let a = &candidate.interval;
        // A local day plus a DST shift bounds how far back an overlapping slot can start.
        let from = (a.utc_start - Duration::hours(26)).date_naive();
        let to = a.utc_end.date_naive();
        for slot in existing_by_utc_date.range(from..=to).flat_map(|(_, s)| s) {
            let b = &slot.interval;
            if overlaps(a, b) {
                conflicts.push(record(
                    a,
                    b,
                    ConflictType::External,
                    format!(
                        "existing {} slot {} on {} (offering {}, slot {})",
                        b.mode, b.local_time, b.calendar_date, slot.offering_id, slot.id
                    ),
                ));
            }
        }
    }

    // Sweep in UTC start order; each candidate only meets those starting before it ends.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by_key(|&i| candidates[i].interval.utc_start);

    let mut pairs = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        let a = &candidates[i].interval;
        for &j in &order[pos + 1..] {
            let b = &candidates[j].interval;
            if b.utc_start >= a.utc_end {
                break;
            }
            if overlaps(a, b) {
                pairs.push((i.min(j), i.max(j)));
            }
        }
    }
    pairs.sort_unstable();

    for (i, j) in pairs {
        let (a, b) = (&candidates[i].interval, &candidates[j].interval);
        conflicts.push(record(
            a,
            b,
            ConflictType::IntraBatch,
            format!(
                "{} slot {} on {} in the same request",
                b.mode, b.local_time, b.calendar_date
            ),
        ));
    }

    conflicts
}

fn record(
    candidate: &Interval,
    other: &Interval,
    conflict_type: ConflictType,
    conflicting_with: String,
) -> ConflictRecord {
    ConflictRecord {
        calendar_date: candidate.calendar_date,
        time_range: candidate.local_time.to_string(),
        mode: candidate.mode,
        conflicting_with,
        conflict_type,
        overlap_minutes: overlap_minutes(candidate, other),
    }
}

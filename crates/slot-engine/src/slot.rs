//! Persisted slots.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::ids::{GuideId, OfferingId, SlotId};
use crate::interval::{Candidate, Interval};

/// One published, bookable interval.
///
/// `booked_count` is written only through the booking collaborator
/// ([`crate::store::SlotStore::set_booked_count`]); the available count is
/// always derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub offering_id: OfferingId,
    pub guide_id: GuideId,
    #[serde(flatten)]
    pub interval: Interval,
    /// Stored alongside the date for query convenience.
    pub day_of_week: Weekday,
    pub capacity: u32,
    booked_count: u32,
    /// Price in minor currency units.
    pub price: u64,
    /// Cleared on cancellation; slots are never hard-deleted once booked.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn from_candidate(
        candidate: Candidate,
        offering_id: OfferingId,
        guide_id: GuideId,
        now: DateTime<Utc>,
    ) -> Self {
        let day_of_week = candidate.interval.day_of_week();
        Self {
            id: SlotId::new(),
            offering_id,
            guide_id,
            interval: candidate.interval,
            day_of_week,
            capacity: candidate.capacity,
            booked_count: 0,
            price: candidate.price,
            active: true,
            created_at: now,
        }
    }

    pub fn booked_count(&self) -> u32 {
        self.booked_count
    }

    /// `max(0, capacity - booked)`, recomputed on every read.
    pub fn available_count(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    pub(crate) fn set_booked_count(&mut self, booked: u32) {
        self.booked_count = booked;
    }

    /// This slot viewed as a candidate, for re-running conflict checks at insert time.
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            interval: self.interval.clone(),
            capacity: self.capacity,
            price: self.price,
        }
    }

    /// A slot may be cancelled only while unbooked and still in the future.
    pub fn check_cancellable(&self, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        if !self.active {
            return Err(ScheduleError::State(format!("slot {} is already cancelled", self.id)));
        }
        if self.booked_count > 0 {
            return Err(ScheduleError::State(format!(
                "slot {} has {} booking(s) and cannot be cancelled",
                self.id, self.booked_count
            )));
        }
        if self.interval.utc_start <= now {
            return Err(ScheduleError::State(format!(
                "slot {} has already started",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{LocalTimeRange, Mode};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    fn slot() -> Slot {
        let interval = Interval::localize(
            Mode::Remote,
            NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            LocalTimeRange::parse("09:00", "10:00").unwrap(),
            Tz::UTC,
        )
        .unwrap();
        Slot::from_candidate(
            Candidate {
                interval,
                capacity: 3,
                price: 500,
            },
            OfferingId::new(),
            GuideId::new(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn available_count_is_derived_and_floored() {
        let mut s = slot();
        assert_eq!(s.available_count(), 3);
        s.set_booked_count(2);
        assert_eq!(s.available_count(), 1);
        s.set_booked_count(5);
        assert_eq!(s.available_count(), 0);
    }

    #[test]
    fn day_of_week_recorded() {
        assert_eq!(slot().day_of_week, Weekday::Mon);
    }

    #[test]
    fn cancellable_only_when_unbooked_and_future() {
        let before = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let at_start = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();

        let s = slot();
        assert!(s.check_cancellable(before).is_ok());
        assert!(matches!(s.check_cancellable(at_start), Err(ScheduleError::State(_))));

        let mut booked = slot();
        booked.set_booked_count(1);
        assert!(matches!(booked.check_cancellable(before), Err(ScheduleError::State(_))));

        let mut cancelled = slot();
        cancelled.active = false;
        assert!(cancelled.check_cancellable(before).is_err());
    }
}

//! All-or-nothing application of a candidate batch.
//!
//! Initial generation, ad-hoc additions, and recurring extensions all end
//! here. Detection and insertion for one guide run inside that guide's
//! critical section, so two batches for the same guide never both pass
//! detection against the same snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conflict::find_conflicts;
use crate::error::ScheduleError;
use crate::ids::GuideId;
use crate::interval::Candidate;
use crate::locks::KeyedLocks;
use crate::offering::Offering;
use crate::slot::Slot;
use crate::store::SlotStore;

pub struct BatchApplier<S: SlotStore + ?Sized> {
    store: Arc<S>,
    locks: KeyedLocks<GuideId>,
}

impl<S: SlotStore + ?Sized> BatchApplier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Detect conflicts for `candidates` on the owning guide's calendar and,
    /// if there are none, persist every candidate as a new slot of `offering`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Conflict`] carrying every conflict found (external and
    /// intra-batch); nothing is persisted in that case.
    pub async fn apply(
        &self,
        offering: &Offering,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, ScheduleError> {
        let guide = offering.guide_id;
        let lock = self.locks.lock_for(guide);
        let _guard = lock.lock().await;

        let existing = self.store.active_slots_for_guide(guide, None).await?;
        debug!(
            guide_id = %guide,
            offering_id = %offering.id,
            candidates = candidates.len(),
            existing = existing.len(),
            "checking batch for conflicts"
        );

        let conflicts = find_conflicts(&candidates, &existing);
        if !conflicts.is_empty() {
            warn!(
                guide_id = %guide,
                offering_id = %offering.id,
                conflicts = conflicts.len(),
                "batch rejected"
            );
            return Err(ScheduleError::Conflict(conflicts));
        }

        let slots: Vec<Slot> = candidates
            .into_iter()
            .map(|c| Slot::from_candidate(c, offering.id, guide, now))
            .collect();

        if !slots.is_empty() {
            self.store.insert_batch(slots.clone()).await?;
        }

        info!(
            guide_id = %guide,
            offering_id = %offering.id,
            created = slots.len(),
            "batch applied"
        );
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Interval, LocalTimeRange, Mode};
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    fn candidate(mode: Mode, day: u32, start: &str, end: &str) -> Candidate {
        Candidate {
            interval: Interval::localize(
                mode,
                NaiveDate::from_ymd_opt(2026, 6, day).unwrap(),
                LocalTimeRange::parse(start, end).unwrap(),
                Tz::UTC,
            )
            .unwrap(),
            capacity: 4,
            price: 900,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn clean_batch_persists_every_candidate() {
        let store = Arc::new(MemoryStore::new());
        let applier = BatchApplier::new(store.clone());
        let offering = Offering::new(GuideId::new(), "Ceramics", Tz::UTC);

        let created = applier
            .apply(
                &offering,
                vec![
                    candidate(Mode::Remote, 1, "09:00", "10:00"),
                    candidate(Mode::Remote, 1, "10:00", "11:00"),
                ],
                now(),
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|s| s.offering_id == offering.id && s.active));
        assert_eq!(store.slots_for_offering(offering.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_conflict_blocks_the_whole_batch() {
        let store = Arc::new(MemoryStore::new());
        let applier = BatchApplier::new(store.clone());
        let guide = GuideId::new();
        let first = Offering::new(guide, "Ceramics", Tz::UTC);
        let second = Offering::new(guide, "Glazing", Tz::UTC);

        applier
            .apply(&first, vec![candidate(Mode::InPerson, 1, "10:30", "11:30")], now())
            .await
            .unwrap();

        let err = applier
            .apply(
                &second,
                vec![
                    candidate(Mode::Remote, 2, "10:00", "11:00"),
                    candidate(Mode::Remote, 1, "10:00", "11:00"),
                    candidate(Mode::Remote, 3, "10:00", "11:00"),
                ],
                now(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.conflicts().map(<[_]>::len), Some(1));
        assert!(store.slots_for_offering(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let applier = BatchApplier::new(store);
        let offering = Offering::new(GuideId::new(), "Ceramics", Tz::UTC);
        assert!(applier.apply(&offering, Vec::new(), now()).await.unwrap().is_empty());
    }
}

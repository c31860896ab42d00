//! Persistence seams for slots, generation jobs, and offering metadata.
//!
//! The traits are what the scheduling core depends on; [`MemoryStore`] is an
//! in-process implementation of all three used by tests and the CLI.
//!
//! Every [`SlotStore`] must reject an insert batch that would overlap an
//! active slot of the same guide (or overlap itself), atomically and without
//! writing anything. The applier's per-guide lock already prevents this in a
//! single process; the store check makes a racing writer fail loudly.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::conflict::find_conflicts;
use crate::error::ScheduleError;
use crate::ids::{GuideId, JobId, OfferingId, SlotId};
use crate::interval::Candidate;
use crate::job::ScheduleRequestJob;
use crate::offering::Offering;
use crate::slot::Slot;

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Active slots of `guide` across all offerings, optionally only on `date`.
    async fn active_slots_for_guide(
        &self,
        guide: GuideId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, ScheduleError>;

    /// Every slot of `offering`, including cancelled ones.
    async fn slots_for_offering(&self, offering: OfferingId) -> Result<Vec<Slot>, ScheduleError>;

    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>, ScheduleError>;

    /// Insert all of `slots` or none of them.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Conflict`] if any slot would overlap an active slot of
    /// its guide or another slot in the batch.
    async fn insert_batch(&self, slots: Vec<Slot>) -> Result<(), ScheduleError>;

    /// Soft-cancel: clear `active`, keep the record.
    ///
    /// The cancellation rules are re-checked in the same write as the flip, so a
    /// booking recorded concurrently is never cancelled out from under its guest.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::State`] if the slot is already cancelled, has bookings,
    /// or starts at or before `now`.
    async fn cancel(&self, id: SlotId, now: DateTime<Utc>) -> Result<Slot, ScheduleError>;

    /// Hard-delete every slot of `offering` ahead of regeneration. Returns the count removed.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::State`] if any of them carries bookings; nothing is removed.
    async fn delete_for_offering(&self, offering: OfferingId) -> Result<usize, ScheduleError>;

    /// Booking collaborator hook: the only write path for a slot's booked count.
    async fn set_booked_count(&self, id: SlotId, booked: u32) -> Result<Slot, ScheduleError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: ScheduleRequestJob) -> Result<(), ScheduleError>;

    async fn get_job(&self, id: JobId) -> Result<Option<ScheduleRequestJob>, ScheduleError>;

    async fn update_job(&self, job: &ScheduleRequestJob) -> Result<(), ScheduleError>;

    /// The non-terminal job of `offering`, if one exists.
    async fn live_job_for_offering(
        &self,
        offering: OfferingId,
    ) -> Result<Option<ScheduleRequestJob>, ScheduleError>;
}

#[async_trait]
pub trait OfferingStore: Send + Sync {
    async fn get_offering(&self, id: OfferingId) -> Result<Option<Offering>, ScheduleError>;

    async fn put_offering(&self, offering: Offering) -> Result<(), ScheduleError>;
}

/// Everything the scheduling service persists.
pub trait SchedulingStore: SlotStore + JobStore + OfferingStore {}

impl<T: SlotStore + JobStore + OfferingStore> SchedulingStore for T {}

// ── MemoryStore ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tables {
    slots: HashMap<SlotId, Slot>,
    jobs: HashMap<JobId, ScheduleRequestJob>,
    offerings: HashMap<OfferingId, Offering>,
}

/// In-memory store; each call holds one lock, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn active_slots_for_guide(
        &self,
        guide: GuideId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, ScheduleError> {
        let tables = self.tables.read().await;
        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| s.active && s.guide_id == guide)
            .filter(|s| date.is_none_or(|d| s.interval.calendar_date == d))
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.interval.utc_start);
        Ok(slots)
    }

    async fn slots_for_offering(&self, offering: OfferingId) -> Result<Vec<Slot>, ScheduleError> {
        let tables = self.tables.read().await;
        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| s.offering_id == offering)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.interval.utc_start);
        Ok(slots)
    }

    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>, ScheduleError> {
        Ok(self.tables.read().await.slots.get(&id).cloned())
    }

    async fn insert_batch(&self, slots: Vec<Slot>) -> Result<(), ScheduleError> {
        let mut tables = self.tables.write().await;

        let mut by_guide: HashMap<GuideId, Vec<Candidate>> = HashMap::new();
        for slot in &slots {
            by_guide.entry(slot.guide_id).or_default().push(slot.as_candidate());
        }

        let mut conflicts = Vec::new();
        for (guide, batch) in &by_guide {
            let existing: Vec<Slot> = tables
                .slots
                .values()
                .filter(|s| s.active && s.guide_id == *guide)
                .cloned()
                .collect();
            conflicts.extend(find_conflicts(batch, &existing));
        }
        if !conflicts.is_empty() {
            return Err(ScheduleError::Conflict(conflicts));
        }

        for slot in slots {
            tables.slots.insert(slot.id, slot);
        }
        Ok(())
    }

    async fn cancel(&self, id: SlotId, now: DateTime<Utc>) -> Result<Slot, ScheduleError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .slots
            .get_mut(&id)
            .ok_or_else(|| ScheduleError::NotFound(format!("slot {id}")))?;
        slot.check_cancellable(now)?;
        slot.active = false;
        Ok(slot.clone())
    }

    async fn delete_for_offering(&self, offering: OfferingId) -> Result<usize, ScheduleError> {
        let mut tables = self.tables.write().await;

        let booked = tables
            .slots
            .values()
            .filter(|s| s.offering_id == offering && s.booked_count() > 0)
            .count();
        if booked > 0 {
            return Err(ScheduleError::State(format!(
                "offering {offering} has {booked} booked slot(s); slots cannot be regenerated"
            )));
        }

        let before = tables.slots.len();
        tables.slots.retain(|_, s| s.offering_id != offering);
        Ok(before - tables.slots.len())
    }

    async fn set_booked_count(&self, id: SlotId, booked: u32) -> Result<Slot, ScheduleError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .slots
            .get_mut(&id)
            .ok_or_else(|| ScheduleError::NotFound(format!("slot {id}")))?;
        slot.set_booked_count(booked);
        Ok(slot.clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: ScheduleRequestJob) -> Result<(), ScheduleError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.contains_key(&job.id) {
            return Err(ScheduleError::Storage(format!("job {} already exists", job.id)));
        }
        tables.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<ScheduleRequestJob>, ScheduleError> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &ScheduleRequestJob) -> Result<(), ScheduleError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| ScheduleError::NotFound(format!("job {}", job.id)))?;
        *stored = job.clone();
        Ok(())
    }

    async fn live_job_for_offering(
        &self,
        offering: OfferingId,
    ) -> Result<Option<ScheduleRequestJob>, ScheduleError> {
        let tables = self.tables.read().await;
        Ok(tables
            .jobs
            .values()
            .find(|j| j.offering_id == offering && !j.is_terminal())
            .cloned())
    }
}

#[async_trait]
impl OfferingStore for MemoryStore {
    async fn get_offering(&self, id: OfferingId) -> Result<Option<Offering>, ScheduleError> {
        Ok(self.tables.read().await.offerings.get(&id).cloned())
    }

    async fn put_offering(&self, offering: Offering) -> Result<(), ScheduleError> {
        self.tables
            .write()
            .await
            .offerings
            .insert(offering.id, offering);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Interval, LocalTimeRange, Mode};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn slot(guide: GuideId, offering: OfferingId, day: u32, start: &str, end: &str) -> Slot {
        let interval = Interval::localize(
            Mode::Remote,
            NaiveDate::from_ymd_opt(2026, 6, day).unwrap(),
            LocalTimeRange::parse(start, end).unwrap(),
            Tz::UTC,
        )
        .unwrap();
        Slot::from_candidate(
            Candidate {
                interval,
                capacity: 2,
                price: 100,
            },
            offering,
            guide,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let guide = GuideId::new();
        let offering = OfferingId::new();

        store
            .insert_batch(vec![slot(guide, offering, 1, "09:00", "10:00")])
            .await
            .unwrap();

        let err = store
            .insert_batch(vec![
                slot(guide, offering, 2, "09:00", "10:00"),
                slot(guide, offering, 1, "09:30", "10:30"),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.conflicts().map(<[_]>::len), Some(1));
        assert_eq!(store.slots_for_offering(offering).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_batch_scopes_conflicts_per_guide() {
        let store = MemoryStore::new();
        let offering = OfferingId::new();
        store
            .insert_batch(vec![slot(GuideId::new(), offering, 1, "09:00", "10:00")])
            .await
            .unwrap();
        store
            .insert_batch(vec![slot(GuideId::new(), offering, 1, "09:00", "10:00")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn guide_query_filters_inactive_and_date() {
        let store = MemoryStore::new();
        let guide = GuideId::new();
        let offering = OfferingId::new();
        let a = slot(guide, offering, 1, "09:00", "10:00");
        let b = slot(guide, offering, 2, "09:00", "10:00");
        let b_id = b.id;
        store.insert_batch(vec![a, b]).await.unwrap();

        let on_second = store
            .active_slots_for_guide(guide, NaiveDate::from_ymd_opt(2026, 6, 2))
            .await
            .unwrap();
        assert_eq!(on_second.len(), 1);

        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        store.cancel(b_id, now).await.unwrap();
        assert_eq!(store.active_slots_for_guide(guide, None).await.unwrap().len(), 1);
        assert_eq!(store.slots_for_offering(offering).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_refuses_when_booked() {
        let store = MemoryStore::new();
        let guide = GuideId::new();
        let offering = OfferingId::new();
        let s = slot(guide, offering, 1, "09:00", "10:00");
        let id = s.id;
        store.insert_batch(vec![s]).await.unwrap();

        let booked = store.set_booked_count(id, 1).await.unwrap();
        assert_eq!(booked.available_count(), 1);
        assert!(matches!(
            store.delete_for_offering(offering).await,
            Err(ScheduleError::State(_))
        ));

        store.set_booked_count(id, 0).await.unwrap();
        assert_eq!(store.delete_for_offering(offering).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_rechecks_bookings_in_the_write() {
        let store = MemoryStore::new();
        let s = slot(GuideId::new(), OfferingId::new(), 1, "09:00", "10:00");
        let id = s.id;
        store.insert_batch(vec![s]).await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();

        // booked after the caller last looked at the slot
        store.set_booked_count(id, 1).await.unwrap();
        assert!(matches!(store.cancel(id, now).await, Err(ScheduleError::State(_))));
        assert!(store.get_slot(id).await.unwrap().unwrap().active);

        store.set_booked_count(id, 0).await.unwrap();
        let cancelled = store.cancel(id, now).await.unwrap();
        assert!(!cancelled.active);
        assert!(matches!(store.cancel(id, now).await, Err(ScheduleError::State(_))));
    }

    #[tokio::test]
    async fn cancel_refuses_started_slot() {
        let store = MemoryStore::new();
        let s = slot(GuideId::new(), OfferingId::new(), 1, "09:00", "10:00");
        let id = s.id;
        store.insert_batch(vec![s]).await.unwrap();

        let at_start = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        assert!(matches!(store.cancel(id, at_start).await, Err(ScheduleError::State(_))));
        assert!(matches!(
            store.cancel(SlotId::new(), at_start).await,
            Err(ScheduleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn insert_batch_rejects_cross_timezone_overlap() {
        let store = MemoryStore::new();
        let guide = GuideId::new();
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let at = |day: u32, start: &str, end: &str, tz: Tz| {
            let interval = Interval::localize(
                Mode::Remote,
                NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
                LocalTimeRange::parse(start, end).unwrap(),
                tz,
            )
            .unwrap();
            let candidate = Candidate {
                interval,
                capacity: 1,
                price: 0,
            };
            Slot::from_candidate(candidate, OfferingId::new(), guide, created)
        };

        // 01:00-02:00 IST on Feb 2 is 19:30-20:30 UTC on Feb 1
        store
            .insert_batch(vec![at(2, "01:00", "02:00", Tz::Asia__Kolkata)])
            .await
            .unwrap();
        let err = store
            .insert_batch(vec![at(1, "19:30", "20:30", Tz::UTC)])
            .await
            .unwrap_err();
        assert_eq!(err.conflicts().map(<[_]>::len), Some(1));
        assert_eq!(store.active_slots_for_guide(guide, None).await.unwrap().len(), 1);
    }
}

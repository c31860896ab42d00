//! The operations callers use to schedule slots.
//!
//! [`SchedulingService`] wires the store, the batch applier, the generation
//! worker, and the clock together. Initial generation is asynchronous and
//! reports through a job record; ad-hoc additions, recurring extensions, and
//! cancellations run synchronously and answer directly.
//!
//! Input validation always happens before the store is read.

use std::sync::Arc;
use tracing::{info, warn};

use crate::applier::BatchApplier;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::expander::{expand_for_offering, explicit_candidates, ExplicitSlot};
use crate::extension::{extension_info, extension_window, validate_extension, ExtensionInfo};
use crate::ids::{JobId, OfferingId, SlotId};
use crate::interval::Mode;
use crate::job::{JobEvent, JobReport, ScheduleRequestJob};
use crate::locks::KeyedLocks;
use crate::offering::{GenerationStatus, Offering};
use crate::recurrence::{ModeSpecs, ScheduleSpec};
use crate::slot::Slot;
use crate::store::SchedulingStore;
use crate::worker::{GenerationRunner, GenerationWorker};

pub struct SchedulingService<S: SchedulingStore + ?Sized + 'static> {
    store: Arc<S>,
    applier: Arc<BatchApplier<S>>,
    worker: GenerationWorker,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    offering_locks: KeyedLocks<OfferingId>,
}

impl<S: SchedulingStore + ?Sized + 'static> SchedulingService<S> {
    /// Build the service and start its generation worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, ScheduleError> {
        config.validate()?;
        let applier = Arc::new(BatchApplier::new(store.clone()));
        let runner = Arc::new(GenerationRunner::new(
            store.clone(),
            applier.clone(),
            clock.clone(),
            config.max_candidates,
        ));
        let worker =
            GenerationWorker::spawn(runner, config.worker_queue_depth, config.worker_concurrency);

        Ok(Self {
            store,
            applier,
            worker,
            clock,
            config,
            offering_locks: KeyedLocks::new(),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Make `offering` known to the engine (or replace its metadata).
    pub async fn register_offering(&self, offering: Offering) -> Result<(), ScheduleError> {
        self.store.put_offering(offering).await
    }

    pub async fn offering(&self, id: OfferingId) -> Result<Offering, ScheduleError> {
        self.store
            .get_offering(id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("offering {id}")))
    }

    // ── Initial generation ──────────────────────────────────────────────────

    /// Record a pending generation job for `offering_id` and queue it.
    ///
    /// Returns as soon as the job is stored; conflicts and failures are only
    /// visible through [`job_status`](Self::job_status). Submitting again
    /// replaces the offering's slots, provided none are booked and no earlier
    /// job is still running.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::NotFound`] for an unknown offering
    /// - [`ScheduleError::Validation`] if a mode is not enabled or none is named
    /// - [`ScheduleError::State`] if a job is still live or a slot is booked
    pub async fn submit_initial_generation(
        &self,
        offering_id: OfferingId,
        specs: ModeSpecs,
    ) -> Result<JobId, ScheduleError> {
        self.offering(offering_id).await?.check_modes(&specs)?;

        let lock = self.offering_locks.lock_for(offering_id);
        let _guard = lock.lock().await;

        // Re-read under the lock so a concurrent change is not written back over.
        let mut offering = self.offering(offering_id).await?;
        offering.check_modes(&specs)?;

        if let Some(live) = self.store.live_job_for_offering(offering_id).await? {
            return Err(ScheduleError::State(format!(
                "job {} for offering {offering_id} is still {}",
                live.id,
                live.status()
            )));
        }
        let booked = self
            .store
            .slots_for_offering(offering_id)
            .await?
            .iter()
            .filter(|s| s.booked_count() > 0)
            .count();
        if booked > 0 {
            return Err(ScheduleError::State(format!(
                "offering {offering_id} has {booked} booked slot(s); slots cannot be regenerated"
            )));
        }

        let now = self.clock.now();
        let spec = ScheduleSpec {
            timezone: offering.timezone,
            modes: specs,
        };
        let job = ScheduleRequestJob::new(offering_id, offering.guide_id, spec.clone(), now);
        let job_id = job.id;

        // The job exists before any slot is removed, so a failed reset is still reported.
        self.store.insert_job(job).await?;
        if let Err(e) = self.reset_for_generation(&mut offering, &spec, job_id).await {
            warn!(job_id = %job_id, error = %e, "could not prepare offering for generation");
            self.fail_job(job_id, &e).await?;
            return Err(e);
        }
        info!(job_id = %job_id, offering_id = %offering_id, "generation job queued");

        if let Err(e) = self.worker.submit(job_id).await {
            warn!(job_id = %job_id, error = %e, "could not queue generation job");
            self.fail_job(job_id, &e).await?;
        }
        Ok(job_id)
    }

    /// Clear the offering's slots and point it at `job_id`. Caller holds the offering lock.
    async fn reset_for_generation(
        &self,
        offering: &mut Offering,
        spec: &ScheduleSpec,
        job_id: JobId,
    ) -> Result<(), ScheduleError> {
        let removed = self.store.delete_for_offering(offering.id).await?;
        if removed > 0 {
            info!(offering_id = %offering.id, removed, "cleared slots for regeneration");
        }

        for (mode, config) in offering.modes.iter_mut() {
            config.recurrence = spec.modes.get(mode).cloned();
        }
        offering.generation_status = GenerationStatus::Pending;
        offering.slots_generated = false;
        offering.latest_job = Some(job_id);
        self.store.put_offering(offering.clone()).await
    }

    /// Settle a job the worker never ran.
    async fn fail_job(&self, job_id: JobId, cause: &ScheduleError) -> Result<(), ScheduleError> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(());
        };
        let now = self.clock.now();
        job.transition(JobEvent::Claim, now)?;
        job.transition(
            JobEvent::Fail {
                error: cause.to_string(),
                conflicts: Vec::new(),
            },
            now,
        )?;
        self.store.update_job(&job).await?;

        if let Some(mut offering) = self.store.get_offering(job.offering_id).await? {
            if offering.latest_job == Some(job_id) {
                offering.generation_status = GenerationStatus::Failed;
                self.store.put_offering(offering).await?;
            }
        }
        Ok(())
    }

    pub async fn job_status(&self, job_id: JobId) -> Result<JobReport, ScheduleError> {
        self.store
            .get_job(job_id)
            .await?
            .map(|job| job.report())
            .ok_or_else(|| ScheduleError::NotFound(format!("job {job_id}")))
    }

    // ── Synchronous paths ───────────────────────────────────────────────────

    /// Add explicit slots for one mode, all or nothing.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Conflict`] with every overlap found; nothing is created.
    pub async fn add_slots(
        &self,
        offering_id: OfferingId,
        mode: Mode,
        slots: &[ExplicitSlot],
    ) -> Result<Vec<Slot>, ScheduleError> {
        let offering = self.offering(offering_id).await?;
        let candidates = explicit_candidates(&offering, mode, slots)?;

        let created = self
            .applier
            .apply(&offering, candidates, self.clock.now())
            .await?;
        info!(offering_id = %offering_id, %mode, created = created.len(), "slots added");
        Ok(created)
    }

    /// Extend an active offering's recurring schedule.
    ///
    /// The extension window is computed from the offering's full slot history,
    /// so its start must fall after every slot ever scheduled, individually
    /// added ones included. The stored original pattern is left untouched.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::State`] if the offering is not active
    /// - [`ScheduleError::Range`] if a mode starts too early or ends past the cap
    /// - [`ScheduleError::Conflict`] with every overlap found
    pub async fn add_recurring_extension(
        &self,
        offering_id: OfferingId,
        specs: ModeSpecs,
    ) -> Result<Vec<Slot>, ScheduleError> {
        self.offering(offering_id).await?.check_modes(&specs)?;

        let lock = self.offering_locks.lock_for(offering_id);
        let _guard = lock.lock().await;

        let offering = self.offering(offering_id).await?;
        offering.check_modes(&specs)?;
        if !offering.is_active() {
            return Err(ScheduleError::State(format!(
                "offering {offering_id} is not active and cannot be extended"
            )));
        }

        let now = self.clock.now();
        let history = self.store.slots_for_offering(offering_id).await?;
        let window = extension_window(
            &offering,
            &history,
            now,
            self.config.extension_horizon_months,
        )?;
        validate_extension(&offering, &specs, &window)?;

        let candidates = expand_for_offering(&offering, &specs, self.config.max_candidates)?;
        let created = self.applier.apply(&offering, candidates, now).await?;
        info!(
            offering_id = %offering_id,
            created = created.len(),
            earliest_allowed_start = %window.earliest_allowed_start,
            "recurring extension applied"
        );
        Ok(created)
    }

    /// Soft-cancel one slot of `offering_id`.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::NotFound`] if the slot does not exist or belongs to another offering
    /// - [`ScheduleError::State`] if it is already cancelled, booked, or has started
    pub async fn cancel_slot(
        &self,
        offering_id: OfferingId,
        slot_id: SlotId,
    ) -> Result<Slot, ScheduleError> {
        self.store
            .get_slot(slot_id)
            .await?
            .filter(|s| s.offering_id == offering_id)
            .ok_or_else(|| {
                ScheduleError::NotFound(format!("slot {slot_id} in offering {offering_id}"))
            })?;

        let cancelled = self.store.cancel(slot_id, self.clock.now()).await?;
        info!(offering_id = %offering_id, slot_id = %slot_id, "slot cancelled");
        Ok(cancelled)
    }

    pub async fn extension_info(&self, offering_id: OfferingId) -> Result<ExtensionInfo, ScheduleError> {
        let offering = self.offering(offering_id).await?;
        let history = self.store.slots_for_offering(offering_id).await?;
        extension_info(
            &offering,
            &history,
            self.clock.now(),
            self.config.extension_horizon_months,
        )
    }

    /// Stop the worker after queued and running jobs finish.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }
}

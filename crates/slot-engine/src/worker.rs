//! Background execution of schedule-request jobs.
//!
//! The request path only writes a pending job record and hands its id to the
//! [`GenerationWorker`]. The worker runs each job through
//! [`GenerationRunner::run`], which owns the whole state machine:
//! claim → expand → apply → complete / fail. Every outcome, including
//! unexpected errors, ends up on the job record and the offering's status
//! mirror; nothing is retried and nothing propagates to the worker loop.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::applier::BatchApplier;
use crate::clock::Clock;
use crate::error::ScheduleError;
use crate::expander::expand_for_offering;
use crate::ids::JobId;
use crate::job::{JobEvent, JobStatus, ScheduleRequestJob};
use crate::offering::GenerationStatus;
use crate::store::SchedulingStore;

/// Executes one generation job end to end.
pub struct GenerationRunner<S: SchedulingStore + ?Sized> {
    store: Arc<S>,
    applier: Arc<BatchApplier<S>>,
    clock: Arc<dyn Clock>,
    max_candidates: usize,
}

impl<S: SchedulingStore + ?Sized> GenerationRunner<S> {
    pub fn new(
        store: Arc<S>,
        applier: Arc<BatchApplier<S>>,
        clock: Arc<dyn Clock>,
        max_candidates: usize,
    ) -> Self {
        Self {
            store,
            applier,
            clock,
            max_candidates,
        }
    }

    /// Run `job_id` to a terminal state. Never fails; problems are logged.
    pub async fn run(&self, job_id: JobId) {
        if let Err(e) = self.try_run(job_id).await {
            error!(job_id = %job_id, error = %e, "generation job bookkeeping failed");
        }
    }

    async fn try_run(&self, job_id: JobId) -> Result<(), ScheduleError> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("job {job_id}")))?;

        if let Err(e) = job.transition(JobEvent::Claim, self.clock.now()) {
            warn!(job_id = %job_id, error = %e, "job not claimable, skipping");
            return Ok(());
        }
        self.store.update_job(&job).await?;
        self.mirror(&job, GenerationStatus::Processing).await?;
        info!(job_id = %job_id, offering_id = %job.offering_id, "generation started");

        let event = match self.generate(&job).await {
            Ok(slots_created) => JobEvent::Complete { slots_created },
            Err(ScheduleError::Conflict(conflicts)) => JobEvent::Fail {
                error: format!("{} conflicting slot(s)", conflicts.len()),
                conflicts,
            },
            Err(e) => JobEvent::Fail {
                error: e.to_string(),
                conflicts: Vec::new(),
            },
        };

        job.transition(event, self.clock.now())?;

        // Mirror while the stored job is still live; a terminal job implies a mirrored offering.
        let mirrored = match job.status() {
            JobStatus::Completed => GenerationStatus::Completed,
            _ => GenerationStatus::Failed,
        };
        self.mirror(&job, mirrored).await?;
        self.store.update_job(&job).await?;

        let report = job.report();
        match report.status {
            JobStatus::Completed => info!(
                job_id = %job_id,
                slots_created = report.slots_created.unwrap_or_default(),
                "generation completed"
            ),
            _ => warn!(
                job_id = %job_id,
                error = report.error.as_deref().unwrap_or_default(),
                "generation failed"
            ),
        }
        Ok(())
    }

    async fn generate(&self, job: &ScheduleRequestJob) -> Result<usize, ScheduleError> {
        let mut offering = self
            .store
            .get_offering(job.offering_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("offering {}", job.offering_id)))?;
        // The job's snapshot is authoritative for how its pattern is localized.
        offering.timezone = job.spec.timezone;

        let candidates = expand_for_offering(&offering, &job.spec.modes, self.max_candidates)?;
        let created = self
            .applier
            .apply(&offering, candidates, self.clock.now())
            .await?;
        Ok(created.len())
    }

    /// Copy the job's progress onto its offering, if this job is still the offering's latest.
    async fn mirror(
        &self,
        job: &ScheduleRequestJob,
        status: GenerationStatus,
    ) -> Result<(), ScheduleError> {
        let Some(mut offering) = self.store.get_offering(job.offering_id).await? else {
            return Ok(());
        };
        if offering.latest_job != Some(job.id) {
            return Ok(());
        }
        offering.generation_status = status;
        offering.slots_generated = status == GenerationStatus::Completed;
        self.store.put_offering(offering).await
    }
}

/// A queue of job ids drained by a background task.
pub struct GenerationWorker {
    tx: mpsc::Sender<JobId>,
    handle: JoinHandle<()>,
}

impl GenerationWorker {
    /// Start the worker loop on the current tokio runtime.
    ///
    /// At most `concurrency` jobs run at once; `queue_depth` ids may wait.
    pub fn spawn<S>(runner: Arc<GenerationRunner<S>>, queue_depth: usize, concurrency: usize) -> Self
    where
        S: SchedulingStore + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<JobId>(queue_depth);
        let permits = Arc::new(Semaphore::new(concurrency));

        let handle = tokio::spawn(async move {
            let mut running = JoinSet::new();
            while let Some(job_id) = rx.recv().await {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let runner = runner.clone();
                running.spawn(async move {
                    runner.run(job_id).await;
                    drop(permit);
                });
                // Reap finished tasks so the set does not grow without bound.
                while running.try_join_next().is_some() {}
            }
            while running.join_next().await.is_some() {}
        });

        Self { tx, handle }
    }

    /// Queue `job_id` for execution.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Storage`] if the worker has stopped.
    pub async fn submit(&self, job_id: JobId) -> Result<(), ScheduleError> {
        self.tx
            .send(job_id)
            .await
            .map_err(|_| ScheduleError::Storage("generation worker is not running".to_string()))
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            error!(error = %e, "generation worker task ended abnormally");
        }
    }
}

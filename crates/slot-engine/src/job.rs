//! Schedule-request job state machine.
//!
//! ```text
//! pending ──Claim──▶ processing ──Complete──▶ completed
//!                         │
//!                         └──────Fail──────▶ failed
//! ```
//!
//! `completed` and `failed` are terminal: every further event is rejected
//! with [`ScheduleError::State`]. A retry is always a new job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conflict::ConflictRecord;
use crate::error::ScheduleError;
use crate::ids::{GuideId, JobId, OfferingId};
use crate::recurrence::ScheduleSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events that drive a job through its states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// An execution takes ownership of a pending job.
    Claim,
    /// The batch was applied.
    Complete { slots_created: usize },
    /// Conflicts were found or execution failed; `conflicts` may be empty.
    Fail {
        error: String,
        conflicts: Vec<ConflictRecord>,
    },
}

/// Durable record of one asynchronous initial-generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequestJob {
    pub id: JobId,
    pub offering_id: OfferingId,
    pub guide_id: GuideId,
    /// The recurrence input exactly as submitted.
    pub spec: ScheduleSpec,
    status: JobStatus,
    error: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    slots_created: Option<usize>,
    conflicts: Vec<ConflictRecord>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleRequestJob {
    pub fn new(
        offering_id: OfferingId,
        guide_id: GuideId,
        spec: ScheduleSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            offering_id,
            guide_id,
            spec,
            status: JobStatus::Pending,
            error: None,
            processed_at: None,
            slots_created: None,
            conflicts: Vec::new(),
            created_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply `event`, or reject it without touching the record.
    pub fn transition(&mut self, event: JobEvent, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        match (self.status, event) {
            (JobStatus::Pending, JobEvent::Claim) => {
                self.status = JobStatus::Processing;
            }
            (JobStatus::Processing, JobEvent::Complete { slots_created }) => {
                self.status = JobStatus::Completed;
                self.slots_created = Some(slots_created);
                self.processed_at = Some(now);
            }
            (JobStatus::Processing, JobEvent::Fail { error, conflicts }) => {
                self.status = JobStatus::Failed;
                self.error = Some(error);
                self.conflicts = conflicts;
                self.processed_at = Some(now);
            }
            (status, event) => {
                return Err(ScheduleError::State(format!(
                    "job {} is {} and cannot accept {:?}",
                    self.id,
                    status,
                    EventKind::from(&event)
                )));
            }
        }
        Ok(())
    }

    /// What a poller sees.
    pub fn report(&self) -> JobReport {
        JobReport {
            job_id: self.id,
            offering_id: self.offering_id,
            status: self.status,
            slots_created: self.slots_created,
            conflicts: (!self.conflicts.is_empty()).then(|| self.conflicts.clone()),
            error: self.error.clone(),
            processed_at: self.processed_at,
        }
    }
}

/// Event name without payload, for error messages.
#[derive(Debug)]
enum EventKind {
    Claim,
    Complete,
    Fail,
}

impl From<&JobEvent> for EventKind {
    fn from(event: &JobEvent) -> Self {
        match event {
            JobEvent::Claim => EventKind::Claim,
            JobEvent::Complete { .. } => EventKind::Complete,
            JobEvent::Fail { .. } => EventKind::Fail,
        }
    }
}

/// Poll response for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub offering_id: OfferingId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

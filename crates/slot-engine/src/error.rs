//! Error types for slot-engine operations.

use thiserror::Error;

use crate::conflict::ConflictRecord;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Scheduling conflict: {} overlapping slot(s)", .0.len())]
    Conflict(Vec<ConflictRecord>),

    #[error("Out of range: {0}")]
    Range(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScheduleError {
    /// The conflict list carried by a [`ScheduleError::Conflict`], if any.
    pub fn conflicts(&self) -> Option<&[ConflictRecord]> {
        match self {
            ScheduleError::Conflict(records) => Some(records),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;

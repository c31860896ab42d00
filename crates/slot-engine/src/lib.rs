//! # slot-engine
//!
//! Conflict-free slot scheduling for guides.
//!
//! A guide's offering is scheduled from per-mode recurrence patterns (weekday
//! set × date range × local time ranges) interpreted in the guide's timezone.
//! The engine expands patterns into concrete UTC intervals, checks them
//! against everything the guide already has booked on the calendar, and
//! persists a batch only if it is entirely conflict-free.
//!
//! ## Modules
//!
//! - [`expander`] — recurrence pattern → timezone-resolved candidate intervals
//! - [`conflict`] — overlap detection across offerings and within a batch
//! - [`applier`] — all-or-nothing persistence of a candidate batch
//! - [`job`] — state machine for asynchronous initial generation
//! - [`worker`] — background execution of generation jobs
//! - [`extension`] — extension window, validation, and slot classification
//! - [`service`] — the operations callers use
//! - [`store`] — persistence traits plus an in-memory implementation
//! - [`temporal`] — timezone, weekday, and time-of-day helpers
//! - [`error`] — error types

pub mod applier;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expander;
pub mod extension;
pub mod ids;
pub mod interval;
pub mod job;
pub mod locks;
pub mod offering;
pub mod recurrence;
pub mod service;
pub mod slot;
pub mod store;
pub mod temporal;
pub mod worker;

pub use applier::BatchApplier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use conflict::{find_conflicts, overlaps, ConflictRecord, ConflictType};
pub use error::ScheduleError;
pub use expander::{expand, expand_for_offering, explicit_candidates, ExplicitSlot};
pub use extension::{
    classify_slots, extension_info, extension_window, validate_extension, ExtensionInfo,
    ExtensionWindow, PatternSummary, SlotClassification, SlotOrigin,
};
pub use ids::{GuideId, JobId, OfferingId, SlotId};
pub use interval::{Candidate, Interval, LocalTimeRange, Mode};
pub use job::{JobEvent, JobReport, JobStatus, ScheduleRequestJob};
pub use offering::{GenerationStatus, ModeConfig, Offering};
pub use recurrence::{DateRange, ModeSpecs, RecurrenceInput, RecurrenceSpec, ScheduleSpec, WeekdaySet};
pub use service::SchedulingService;
pub use slot::Slot;
pub use store::{JobStore, MemoryStore, OfferingStore, SchedulingStore, SlotStore};

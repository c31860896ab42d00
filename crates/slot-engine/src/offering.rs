//! Offering metadata consumed by the scheduling core.
//!
//! Offerings are owned by an external catalogue; the engine only reads their
//! per-mode capacity, price and stored recurrence, and writes back the
//! generation status mirror that callers poll.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ScheduleError;
use crate::ids::{GuideId, JobId, OfferingId};
use crate::interval::Mode;
use crate::recurrence::{ModeSpecs, RecurrenceSpec};

/// Capacity, price and the stored original pattern for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub enabled: bool,
    pub capacity: u32,
    /// Price in minor currency units.
    pub price: u64,
    /// The pattern used for the most recent initial generation.
    pub recurrence: Option<RecurrenceSpec>,
}

impl ModeConfig {
    pub fn new(capacity: u32, price: u64) -> Result<Self, ScheduleError> {
        if capacity == 0 {
            return Err(ScheduleError::Validation(
                "capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            enabled: true,
            capacity,
            price,
            recurrence: None,
        })
    }
}

/// Mirror of the latest generation job's status, readable without the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    NotStarted,
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: OfferingId,
    pub guide_id: GuideId,
    pub title: String,
    /// The guide's configured timezone; every slot is localized in it.
    pub timezone: Tz,
    pub modes: BTreeMap<Mode, ModeConfig>,
    pub generation_status: GenerationStatus,
    pub slots_generated: bool,
    pub archived: bool,
    pub latest_job: Option<JobId>,
}

impl Offering {
    pub fn new(guide_id: GuideId, title: impl Into<String>, timezone: Tz) -> Self {
        Self {
            id: OfferingId::new(),
            guide_id,
            title: title.into(),
            timezone,
            modes: BTreeMap::new(),
            generation_status: GenerationStatus::NotStarted,
            slots_generated: false,
            archived: false,
            latest_job: None,
        }
    }

    /// Enable `mode` with the given capacity and price.
    pub fn with_mode(mut self, mode: Mode, capacity: u32, price: u64) -> Result<Self, ScheduleError> {
        self.modes.insert(mode, ModeConfig::new(capacity, price)?);
        Ok(self)
    }

    /// The configuration for `mode`, provided the mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Validation`] when the mode is missing or disabled.
    pub fn enabled_mode(&self, mode: Mode) -> Result<&ModeConfig, ScheduleError> {
        self.modes
            .get(&mode)
            .filter(|config| config.enabled)
            .ok_or_else(|| {
                ScheduleError::Validation(format!("mode {mode} is not enabled on this offering"))
            })
    }

    /// Check that every mode named in `specs` is enabled.
    pub fn check_modes(&self, specs: &ModeSpecs) -> Result<(), ScheduleError> {
        if specs.is_empty() {
            return Err(ScheduleError::Validation(
                "at least one mode must be scheduled".to_string(),
            ));
        }
        for mode in specs.keys() {
            self.enabled_mode(*mode)?;
        }
        Ok(())
    }

    /// An offering accepts extensions once generation completed and it is live.
    pub fn is_active(&self) -> bool {
        self.generation_status == GenerationStatus::Completed && self.slots_generated && !self.archived
    }

    /// The stored original pattern per enabled mode.
    pub fn original_patterns(&self) -> impl Iterator<Item = (Mode, &RecurrenceSpec)> {
        self.modes.iter().filter_map(|(mode, config)| {
            config
                .recurrence
                .as_ref()
                .filter(|_| config.enabled)
                .map(|spec| (*mode, spec))
        })
    }

    /// The last date covered by any stored original pattern.
    pub fn original_pattern_end(&self) -> Option<NaiveDate> {
        self.original_patterns()
            .map(|(_, spec)| spec.date_range().end)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        assert!(ModeConfig::new(0, 100).is_err());
    }

    #[test]
    fn disabled_mode_is_not_enabled() {
        let mut offering = Offering::new(GuideId::new(), "Pottery", Tz::UTC)
            .with_mode(Mode::Remote, 5, 1000)
            .unwrap();
        assert!(offering.enabled_mode(Mode::Remote).is_ok());
        assert!(offering.enabled_mode(Mode::InPerson).is_err());

        if let Some(config) = offering.modes.get_mut(&Mode::Remote) {
            config.enabled = false;
        }
        assert!(offering.enabled_mode(Mode::Remote).is_err());
    }

    #[test]
    fn new_offering_is_not_active() {
        let offering = Offering::new(GuideId::new(), "Pottery", Tz::UTC);
        assert!(!offering.is_active());
        assert_eq!(offering.original_pattern_end(), None);
    }
}

//! Engine configuration.
//!
//! Loaded from TOML; every key is optional and falls back to its default.
//!
//! ```toml
//! extension_horizon_months = 6
//! max_candidates = 10000
//! worker_queue_depth = 64
//! worker_concurrency = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How far past "today" (guide-local) a recurring extension may reach.
    pub extension_horizon_months: u32,
    /// Upper bound on candidates produced by a single expansion run.
    pub max_candidates: usize,
    /// Jobs that may wait for the generation worker before submit back-pressures.
    pub worker_queue_depth: usize,
    /// Generation jobs executed concurrently.
    pub worker_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extension_horizon_months: 6,
            max_candidates: 10_000,
            worker_queue_depth: 64,
            worker_concurrency: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ScheduleError> {
        let config: Self =
            toml::from_str(s).map_err(|e| ScheduleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ScheduleError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScheduleError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        let zero = [
            ("extension_horizon_months", self.extension_horizon_months as usize),
            ("max_candidates", self.max_candidates),
            ("worker_queue_depth", self.worker_queue_depth),
            ("worker_concurrency", self.worker_concurrency),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((key, _)) => Err(ScheduleError::Config(format!("{key} must be positive"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_toml_str("extension_horizon_months = 3").unwrap();
        assert_eq!(config.extension_horizon_months, 3);
        assert_eq!(config.max_candidates, 10_000);
    }

    #[test]
    fn zero_and_unknown_keys_rejected() {
        let err = EngineConfig::from_toml_str("worker_concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("worker_concurrency"), "got: {err}");
        assert!(EngineConfig::from_toml_str("horizon = 6").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_candidates = 250").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_candidates, 250);
    }
}

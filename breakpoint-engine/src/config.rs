// Engine configuration
//
// Loaded from JSON; every field has a default so partial files are fine.

use crate::error::ConfigError;
use crate::step::StepConflictPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_HIDDEN_EXCEPTION_CLASS: &str = "java.lang.Throwable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global "breakpoints active" switch at session start
    pub breakpoints_active: bool,
    /// Stop on every uncaught exception through a hidden breakpoint
    pub catch_uncaught_exceptions: bool,
    /// Class watched by the hidden uncaught-exception breakpoint
    pub hidden_exception_class: String,
    /// Remembered answer for step/breakpoint conflicts
    pub step_conflict: Option<StepConflictPolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            breakpoints_active: true,
            catch_uncaught_exceptions: false,
            hidden_exception_class: DEFAULT_HIDDEN_EXCEPTION_CLASS.to_string(),
            step_conflict: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

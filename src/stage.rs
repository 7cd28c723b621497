//! Stage trait and per-stage reporting
//!
//! Every optional stereo and dynamic stage implements [`Stage`]. A stage
//! reads its input buffer and returns a new one; it never mutates the input,
//! so the pipeline can restore the previous buffer when a stage misbehaves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::stems::StemSet;

/// What a stage did, for the diagnostics record only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    /// Stage was switched on in the preset
    pub enabled: bool,
    /// Stage changed the signal
    pub applied: bool,
    /// Stage output was discarded (non-finite samples)
    #[serde(default)]
    pub bypassed: bool,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StageReport {
    /// Report for a stage that ran
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            enabled: true,
            applied: true,
            bypassed: false,
            metrics: BTreeMap::new(),
            note: None,
        }
    }

    /// Report for a stage switched off in the preset
    pub fn disabled(stage: &str) -> Self {
        Self {
            enabled: false,
            applied: false,
            ..Self::new(stage)
        }
    }

    /// Report for a stage that ran but left the signal alone
    pub fn skipped(stage: &str, note: impl Into<String>) -> Self {
        Self {
            applied: false,
            note: Some(note.into()),
            ..Self::new(stage)
        }
    }

    pub fn metric(mut self, name: &str, value: f64) -> Self {
        // Non-finite values have no JSON representation
        let value = if value.is_finite() { value } else { 0.0 };
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Read-only inputs shared by all stages of one job
#[derive(Debug, Clone, Copy, Default)]
pub struct StageContext<'a> {
    /// Separated stems of the stage input, when a separator produced them
    pub stems: Option<&'a StemSet>,
}

/// One processing step of the mastering chain
pub trait Stage: Send + Sync {
    /// Stable identifier used in reports and logs
    fn name(&self) -> &'static str;

    /// Process a buffer into a new buffer of the same shape
    fn process(&self, buffer: &AudioBuffer, ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)>;
}

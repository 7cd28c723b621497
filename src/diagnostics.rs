//! Diagnostics record of one mastering job
//!
//! Reporting only: nothing here feeds back into the signal path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::convolve::CacheStats;
use crate::governor::GovernorSummary;
use crate::measure::ProgramMetrics;
use crate::stage::StageReport;

/// Curve EQ outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqSummary {
    pub enabled: bool,
    /// Curve came from a reference rather than the translation curve
    pub reference_matched: bool,
    /// Reference had to be resampled to the target rate
    pub reference_resampled: bool,
    pub fir_taps: usize,
    /// Largest absolute gain of the shaped curve (dB)
    pub max_curve_db: f64,
}

impl EqSummary {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            reference_matched: false,
            reference_resampled: false,
            fir_taps: 0,
            max_curve_db: 0.0,
        }
    }
}

/// Stem separation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemsSummary {
    /// Preset asked for stems
    pub requested: bool,
    /// Stems were produced and handed to the stages
    pub available: bool,
    pub separator: String,
    #[serde(default)]
    pub stems: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    pub job_id: Uuid,
    pub preset: String,
    pub sample_rate: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub before: ProgramMetrics,
    pub after: ProgramMetrics,
    /// Loudness target the governor settled on (LUFS)
    pub chosen_target_lufs: f64,
    /// Deepest limiter gain of the chosen candidate (dB)
    pub min_limiter_gain_db: f64,
    pub eq: EqSummary,
    pub stems: StemsSummary,
    /// Stereo and dynamic stages, in processing order
    pub stages: Vec<StageReport>,
    pub governor: GovernorSummary,
    pub spectrum_cache: CacheStats,
}

impl StageDiagnostics {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == name)
    }

    /// Names of stages whose output was discarded
    pub fn bypassed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|r| r.bypassed)
            .map(|r| r.stage.as_str())
            .collect()
    }
}

//! Mastering pipeline
//!
//! Runs one job end to end: curve EQ through the streaming convolver, the
//! optional stereo and dynamic stages, then the loudness governor driving
//! the peak chain. Jobs share nothing mutable except the spectrum cache, so
//! one engine can serve many threads.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::convolve::{Alignment, ConvolutionEngine, SpectrumCache};
use crate::diagnostics::{EqSummary, StageDiagnostics, StemsSummary};
use crate::dynamics::{DeEsser, HarmonicExciter, MaskingDip, SectionLift, TransientShaper};
use crate::engine::{AudioBuffer, MIN_SAMPLE_RATE};
use crate::eq::{CurveDesigner, FirFilter};
use crate::error::{MasterError, Result};
use crate::governor::LoudnessGovernor;
use crate::measure::ProgramMetrics;
use crate::peak::PeakChain;
use crate::preset::Preset;
use crate::stage::{Stage, StageContext, StageReport};
use crate::stems::{NullSeparator, StemSeparator, StemSet};
use crate::stereo::{MicroDetail, MicroShift, MonoSub, SpatialWiden};

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag checked between stages and between governor steps
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` naming the stage about to run, if cancelled
    pub fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            tracing::info!(stage, "job cancelled");
            return Err(MasterError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Job and output
// ============================================================================

/// One unit of work: target, optional reference and the preset to apply
#[derive(Debug, Clone)]
pub struct MasteringJob {
    pub id: Uuid,
    pub target: AudioBuffer,
    pub reference: Option<AudioBuffer>,
    pub preset: Preset,
}

impl MasteringJob {
    pub fn new(target: AudioBuffer, preset: Preset) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            reference: None,
            preset,
        }
    }

    pub fn with_reference(mut self, reference: AudioBuffer) -> Self {
        self.reference = Some(reference);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MasteringOutput {
    /// Mastered audio at the target's sample rate, clamped to [-1, 1]
    pub buffer: AudioBuffer,
    pub diagnostics: StageDiagnostics,
}

// ============================================================================
// Engine
// ============================================================================

pub struct MasteringEngine {
    convolver: ConvolutionEngine,
    separator: Arc<dyn StemSeparator>,
}

impl Default for MasteringEngine {
    fn default() -> Self {
        Self::new(Arc::new(SpectrumCache::default()))
    }
}

impl MasteringEngine {
    pub fn new(cache: Arc<SpectrumCache>) -> Self {
        Self {
            convolver: ConvolutionEngine::new(cache),
            separator: Arc::new(NullSeparator),
        }
    }

    pub fn with_stem_separator(mut self, separator: Arc<dyn StemSeparator>) -> Self {
        self.separator = separator;
        self
    }

    pub fn cache(&self) -> &Arc<SpectrumCache> {
        self.convolver.cache()
    }

    /// Master one job
    ///
    /// # Errors
    /// * `EmptyAudio` - target holds no samples
    /// * `InvalidAudio` - target or reference is non-finite or below
    ///   [`MIN_SAMPLE_RATE`]
    /// * `InvalidParameter` - preset fails validation
    /// * `Cancelled` - token set at a stage boundary or governor step
    /// * `CacheCorrupted` - shared spectrum cache returned a bad entry
    pub fn master(&self, job: &MasteringJob, cancel: &CancellationToken) -> Result<MasteringOutput> {
        let preset = &job.preset;
        preset.validate()?;
        if job.target.is_empty() {
            return Err(MasterError::EmptyAudio);
        }
        check_programme(&job.target, "target")?;
        if let Some(reference) = job.reference.as_ref().filter(|r| !r.is_empty()) {
            check_programme(reference, "reference")?;
        }

        let started_at = Utc::now();
        tracing::info!(
            job = %job.id,
            preset = %preset.name,
            samples = job.target.len(),
            sample_rate = job.target.sample_rate,
            "mastering job started"
        );
        let before = ProgramMetrics::measure(&job.target);

        cancel.checkpoint("eq")?;
        let (mut buffer, eq) = self.equalize(&job.target, job.reference.as_ref(), preset)?;

        cancel.checkpoint("stems")?;
        let (stems, stems_summary) = self.separate(&buffer, preset);
        let ctx = StageContext {
            stems: stems.as_ref(),
        };

        let mut reports = Vec::new();
        for (enabled, stage) in build_stages(preset) {
            cancel.checkpoint(stage.name())?;
            if !enabled {
                reports.push(StageReport::disabled(stage.name()));
                continue;
            }
            let (next, report) = run_stage(stage.as_ref(), &buffer, &ctx)?;
            buffer = next;
            reports.push(report);
        }

        cancel.checkpoint("governor")?;
        let chain = PeakChain::new(
            preset.true_peak_ceiling_db,
            preset.soft_clip.enabled.then_some(preset.soft_clip.params),
            preset.limiter,
        );
        let result = LoudnessGovernor::new(preset.target_lufs, preset.governor, chain).run(&buffer, cancel)?;
        let governor = result.summary();
        let mut buffer = result.buffer;
        buffer.clamp();

        let after = ProgramMetrics::measure(&buffer);
        tracing::info!(
            job = %job.id,
            before_lufs = before.estimated_lufs,
            after_lufs = after.estimated_lufs,
            true_peak = after.true_peak_dbtp,
            "mastering job finished"
        );

        let diagnostics = StageDiagnostics {
            job_id: job.id,
            preset: preset.name.clone(),
            sample_rate: buffer.sample_rate,
            started_at,
            finished_at: Utc::now(),
            before,
            after,
            chosen_target_lufs: governor.target_lufs,
            min_limiter_gain_db: governor.min_gain_db,
            eq,
            stems: stems_summary,
            stages: reports,
            governor,
            spectrum_cache: self.cache().stats(),
        };

        Ok(MasteringOutput { buffer, diagnostics })
    }

    /// Curve design, FIR design and same-aligned convolution
    fn equalize(
        &self,
        target: &AudioBuffer,
        reference: Option<&AudioBuffer>,
        preset: &Preset,
    ) -> Result<(AudioBuffer, EqSummary)> {
        if !preset.eq_enabled {
            return Ok((target.clone(), EqSummary::disabled()));
        }

        let reference = match reference {
            Some(r) if r.is_empty() => {
                tracing::warn!("reference holds no samples, using the translation curve");
                None
            }
            Some(r) if r.sample_rate != target.sample_rate => {
                tracing::debug!(from = r.sample_rate, to = target.sample_rate, "resampling reference");
                Some(Cow::Owned(r.resampled(target.sample_rate)))
            }
            Some(r) => Some(Cow::Borrowed(r)),
            None => None,
        };
        let resampled = matches!(reference, Some(Cow::Owned(_)));

        let curve = CurveDesigner::new(preset.curve).design(target, reference.as_deref())?;
        let filter = FirFilter::design(&curve, preset.fir_taps, target.sample_rate)?;
        let output = self.convolver.apply(target, &filter, Alignment::Same)?;

        let summary = EqSummary {
            enabled: true,
            reference_matched: reference.is_some(),
            reference_resampled: resampled,
            fir_taps: filter.len(),
            max_curve_db: curve.max_abs_db(),
        };
        tracing::debug!(
            taps = summary.fir_taps,
            max_curve_db = summary.max_curve_db,
            reference = summary.reference_matched,
            "curve eq"
        );
        Ok((output, summary))
    }

    /// Ask the separator for stems; any failure degrades to the mixed buffer
    fn separate(&self, buffer: &AudioBuffer, preset: &Preset) -> (Option<StemSet>, StemsSummary) {
        let mut summary = StemsSummary {
            requested: preset.use_stems,
            available: false,
            separator: self.separator.name().to_string(),
            stems: Vec::new(),
            note: None,
        };
        if !preset.use_stems {
            return (None, summary);
        }
        if !self.separator.available() {
            tracing::warn!(separator = %summary.separator, "stem separation unavailable, using the mix");
            summary.note = Some("separator unavailable".to_string());
            return (None, summary);
        }

        match self.separator.separate(buffer) {
            Ok(stems) => {
                summary.available = true;
                summary.stems = stems.names().map(str::to_string).collect();
                (Some(stems), summary)
            }
            Err(e) => {
                let err = MasterError::StemSeparation { reason: e.to_string() };
                tracing::warn!(error = %err, "using the mix");
                summary.note = Some(err.to_string());
                (None, summary)
            }
        }
    }
}

/// Audio the stages can safely take: finite samples at a usable rate
fn check_programme(buffer: &AudioBuffer, role: &str) -> Result<()> {
    if buffer.sample_rate < MIN_SAMPLE_RATE {
        return Err(MasterError::InvalidAudio {
            reason: format!(
                "{} sample rate {} Hz is below {} Hz",
                role, buffer.sample_rate, MIN_SAMPLE_RATE
            ),
            source: None,
        });
    }
    if !buffer.is_finite() {
        return Err(MasterError::InvalidAudio {
            reason: format!("{} contains NaN or infinite samples", role),
            source: None,
        });
    }
    Ok(())
}

/// Optional stages in processing order, each with its enable flag
fn build_stages(preset: &Preset) -> Vec<(bool, Box<dyn Stage>)> {
    fn entry<S: Stage + 'static>(enabled: bool, stage: S) -> (bool, Box<dyn Stage>) {
        (enabled, Box::new(stage))
    }

    let p = preset;
    vec![
        entry(p.mono_sub.enabled, MonoSub::new(p.mono_sub.params)),
        entry(p.spatial_widen.enabled, SpatialWiden::new(p.spatial_widen.params)),
        entry(p.micro_shift.enabled, MicroShift::new(p.micro_shift.params)),
        entry(p.micro_detail.enabled, MicroDetail::new(p.micro_detail.params)),
        entry(p.masking_dip.enabled, MaskingDip::new(p.masking_dip.params)),
        entry(p.de_ess.enabled, DeEsser::new(p.de_ess.params)),
        entry(p.harmonics.enabled, HarmonicExciter::new(p.harmonics.params)),
        entry(p.transient_shaper.enabled, TransientShaper::new(p.transient_shaper.params)),
        entry(p.section_lift.enabled, SectionLift::new(p.section_lift.params)),
    ]
}

/// Run one stage, restoring its input when the output is unusable
fn run_stage(stage: &dyn Stage, buffer: &AudioBuffer, ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
    let bypass = |reason: String| {
        let err = MasterError::DspOverflow {
            stage: stage.name().to_string(),
        };
        tracing::warn!(error = %err, reason = %reason, "stage bypassed");
        let mut report = StageReport::new(stage.name()).with_note(reason);
        report.applied = false;
        report.bypassed = true;
        (buffer.clone(), report)
    };

    match stage.process(buffer, ctx) {
        Ok((out, report)) => {
            if !out.is_finite() {
                return Ok(bypass("non-finite output".to_string()));
            }
            if out.len() != buffer.len() || out.sample_rate != buffer.sample_rate {
                return Ok(bypass("output shape changed".to_string()));
            }
            tracing::debug!(stage = stage.name(), applied = report.applied, metrics = ?report.metrics, "stage");
            Ok((out, report))
        }
        Err(e) if e.is_recoverable() => Ok(bypass(e.to_string())),
        Err(e) => Err(e),
    }
}

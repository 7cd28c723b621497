//! Mastering presets
//!
//! A [`Preset`] is an immutable bundle of every stage parameter for one job.
//! Named presets cover the common delivery targets; job-level overrides
//! produce a new, re-validated preset rather than editing one in place.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dynamics::{DeEssParams, HarmonicsParams, MaskingParams, SectionLiftParams, TransientParams};
use crate::eq::fir::{MAX_TAPS, MIN_TAPS};
use crate::eq::CurveShaping;
use crate::error::{MasterError, Result};
use crate::governor::GovernorParams;
use crate::peak::{LimiterParams, SoftClipParams};
use crate::stereo::{MicroDetailParams, MicroShiftParams, MonoSubParams, WidenParams};

/// Names accepted by [`Preset::named`]
pub const PRESET_NAMES: [&str; 3] = ["hi_fi_streaming", "club", "radio_loud"];

/// Default FIR length for the curve EQ
pub const DEFAULT_FIR_TAPS: usize = 4097;

/// An optional stage and its parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle<P> {
    pub enabled: bool,
    pub params: P,
}

impl<P> Toggle<P> {
    pub fn off(params: P) -> Self {
        Self { enabled: false, params }
    }

    pub fn on(params: P) -> Self {
        Self { enabled: true, params }
    }
}

// ============================================================================
// Preset
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub name: String,
    /// Loudness target (LUFS, approximate meter)
    pub target_lufs: f64,
    /// True-peak ceiling (dBTP)
    pub true_peak_ceiling_db: f64,
    /// Curve EQ filter length, forced odd at design time
    pub fir_taps: usize,
    pub eq_enabled: bool,
    pub curve: CurveShaping,
    pub soft_clip: Toggle<SoftClipParams>,
    pub limiter: LimiterParams,
    pub governor: GovernorParams,
    /// Ask the stem separator for stems when one is available
    pub use_stems: bool,

    // Stereo field
    pub mono_sub: Toggle<MonoSubParams>,
    pub spatial_widen: Toggle<WidenParams>,
    pub micro_shift: Toggle<MicroShiftParams>,
    pub micro_detail: Toggle<MicroDetailParams>,

    // Dynamic stages
    pub masking_dip: Toggle<MaskingParams>,
    pub de_ess: Toggle<DeEssParams>,
    pub harmonics: Toggle<HarmonicsParams>,
    pub transient_shaper: Toggle<TransientParams>,
    pub section_lift: Toggle<SectionLiftParams>,
}

impl Default for Preset {
    fn default() -> Self {
        Self::hi_fi_streaming()
    }
}

impl Preset {
    /// Transparent streaming master: -14 LUFS, -1.0 dBTP, no governor headroom
    ///
    /// Curve EQ and soft clip are on; every stereo and dynamic stage is
    /// opt-in.
    pub fn hi_fi_streaming() -> Self {
        Self {
            name: "hi_fi_streaming".to_string(),
            target_lufs: -14.0,
            true_peak_ceiling_db: -1.0,
            fir_taps: DEFAULT_FIR_TAPS,
            eq_enabled: true,
            curve: CurveShaping {
                max_db: 3.0,
                smoothing_hz: 120.0,
                strength: 0.7,
                hf_strength: 0.8,
            },
            soft_clip: Toggle::on(SoftClipParams::default()),
            limiter: LimiterParams::default(),
            governor: GovernorParams::default(),
            use_stems: false,
            mono_sub: Toggle::off(MonoSubParams::default()),
            spatial_widen: Toggle::off(WidenParams::default()),
            micro_shift: Toggle::off(MicroShiftParams::default()),
            micro_detail: Toggle::off(MicroDetailParams::default()),
            masking_dip: Toggle::off(MaskingParams::default()),
            de_ess: Toggle::off(DeEssParams::default()),
            harmonics: Toggle::off(HarmonicsParams::default()),
            transient_shaper: Toggle::off(TransientParams::default()),
            section_lift: Toggle::off(SectionLiftParams::default()),
        }
    }

    /// Dense club master: -9 LUFS, -0.8 dBTP, 1.5 dB clip drive
    pub fn club() -> Self {
        let base = Self::hi_fi_streaming();
        Self {
            name: "club".to_string(),
            target_lufs: -9.0,
            true_peak_ceiling_db: -0.8,
            soft_clip: Toggle::on(SoftClipParams {
                drive_db: 1.5,
                ..base.soft_clip.params
            }),
            governor: GovernorParams {
                headroom_db: 0.5,
                ..base.governor
            },
            ..base
        }
    }

    /// Loud broadcast master: -10 LUFS, -1.0 dBTP, 1.5 dB clip drive
    pub fn radio_loud() -> Self {
        let base = Self::hi_fi_streaming();
        Self {
            name: "radio_loud".to_string(),
            target_lufs: -10.0,
            soft_clip: Toggle::on(SoftClipParams {
                drive_db: 1.5,
                ..base.soft_clip.params
            }),
            governor: GovernorParams {
                headroom_db: 0.5,
                ..base.governor
            },
            ..base
        }
    }

    /// Look up a named preset
    ///
    /// # Errors
    /// `UnknownPreset` for any name outside [`PRESET_NAMES`].
    pub fn named(name: &str) -> Result<Self> {
        match name {
            "hi_fi_streaming" => Ok(Self::hi_fi_streaming()),
            "club" => Ok(Self::club()),
            "radio_loud" => Ok(Self::radio_loud()),
            _ => Err(MasterError::UnknownPreset {
                name: name.to_string(),
            }),
        }
    }

    /// Every named preset, in [`PRESET_NAMES`] order
    pub fn all() -> Vec<Self> {
        vec![Self::hi_fi_streaming(), Self::club(), Self::radio_loud()]
    }

    /// Load and validate a preset from JSON; missing fields take the
    /// `hi_fi_streaming` values
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MasterError::FileNotFound {
                path: path.display().to_string(),
                source: None,
            });
        }
        let text = std::fs::read_to_string(path)?;
        let preset: Preset = serde_json::from_str(&text)?;
        preset.validate()?;
        Ok(preset)
    }

    /// Apply job-level overrides, returning a new validated preset
    pub fn with_overrides(&self, overrides: &PresetOverrides) -> Result<Self> {
        let mut preset = self.clone();
        let o = overrides;

        if let Some(v) = o.target_lufs {
            preset.target_lufs = v;
        }
        if let Some(v) = o.true_peak_ceiling_db {
            preset.true_peak_ceiling_db = v;
        }
        if let Some(v) = o.fir_taps {
            preset.fir_taps = v;
        }
        if let Some(v) = o.eq {
            preset.eq_enabled = v;
        }
        if let Some(v) = o.soft_clip {
            preset.soft_clip.enabled = v;
        }
        if let Some(v) = o.use_stems {
            preset.use_stems = v;
        }

        let toggles = [
            (o.mono_sub, &mut preset.mono_sub.enabled),
            (o.spatial_widen, &mut preset.spatial_widen.enabled),
            (o.micro_shift, &mut preset.micro_shift.enabled),
            (o.micro_detail, &mut preset.micro_detail.enabled),
            (o.masking_dip, &mut preset.masking_dip.enabled),
            (o.de_ess, &mut preset.de_ess.enabled),
            (o.harmonics, &mut preset.harmonics.enabled),
            (o.transient_shaper, &mut preset.transient_shaper.enabled),
            (o.section_lift, &mut preset.section_lift.enabled),
        ];
        for (value, flag) in toggles {
            if let Some(v) = value {
                *flag = v;
            }
        }

        preset.validate()?;
        Ok(preset)
    }

    /// Enable flag of every switchable module, keyed by report name
    pub fn enabled_modules(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("eq", self.eq_enabled),
            ("soft_clip", self.soft_clip.enabled),
            ("stems", self.use_stems),
            ("mono_sub", self.mono_sub.enabled),
            ("spatial_widen", self.spatial_widen.enabled),
            ("micro_shift", self.micro_shift.enabled),
            ("micro_detail", self.micro_detail.enabled),
            ("masking_dip", self.masking_dip.enabled),
            ("de_ess", self.de_ess.enabled),
            ("harmonics", self.harmonics.enabled),
            ("transient_shaper", self.transient_shaper.enabled),
            ("section_lift", self.section_lift.enabled),
        ])
    }

    /// Range-check every numeric parameter
    ///
    /// # Errors
    /// `InvalidParameter` naming the first field out of range.
    pub fn validate(&self) -> Result<()> {
        check("target_lufs", self.target_lufs, -40.0, 0.0)?;
        check("true_peak_ceiling_db", self.true_peak_ceiling_db, -12.0, 0.0)?;
        check("fir_taps", self.fir_taps as f64, MIN_TAPS as f64, MAX_TAPS as f64)?;

        check("curve.max_db", self.curve.max_db, 0.0, 24.0)?;
        check("curve.smoothing_hz", self.curve.smoothing_hz, 0.0, 2000.0)?;
        check("curve.strength", self.curve.strength, 0.0, 2.0)?;
        check("curve.hf_strength", self.curve.hf_strength, 0.0, 2.0)?;

        let clip = &self.soft_clip.params;
        check("soft_clip.knee_db", clip.knee_db, 0.0, 12.0)?;
        check("soft_clip.drive_db", clip.drive_db, 0.0, 12.0)?;
        check("soft_clip.mix", clip.mix, 0.0, 1.0)?;
        check("soft_clip.oversample", clip.oversample as f64, 1.0, 16.0)?;

        let lim = &self.limiter;
        check("limiter.lookahead_ms", lim.lookahead_ms, 0.0, 20.0)?;
        check("limiter.attack_ms", lim.attack_ms, 0.0, 100.0)?;
        check("limiter.release_ms", lim.release_ms, 1.0, 2000.0)?;
        check("limiter.link", lim.link, 0.0, 1.0)?;

        let gov = &self.governor;
        check("governor.headroom_db", gov.headroom_db, -12.0, 12.0)?;
        check("governor.steps", gov.steps as f64, 1.0, 32.0)?;
        check("governor.step_db", gov.step_db, 0.01, 6.0)?;
        check("governor.gr_floor_db", gov.gr_floor_db, -24.0, 0.0)?;
        check("governor.tp_tolerance_db", gov.tp_tolerance_db, 0.0, 1.0)?;

        let sub = &self.mono_sub.params;
        check("mono_sub.min_cutoff_hz", sub.min_cutoff_hz, 20.0, sub.max_cutoff_hz)?;
        check("mono_sub.min_strength", sub.min_strength, 0.0, sub.max_strength)?;
        check("mono_sub.max_strength", sub.max_strength, 0.0, 1.0)?;

        let widen = &self.spatial_widen.params;
        check("spatial_widen.low_split_hz", widen.low_split_hz, 20.0, widen.high_split_hz)?;
        check("spatial_widen.mid_width", widen.mid_width, 0.0, 3.0)?;
        check("spatial_widen.high_width", widen.high_width, 0.0, 3.0)?;
        check_guard("spatial_widen", widen.guard_low, widen.guard_high)?;

        let shift = &self.micro_shift.params;
        check("micro_shift.delay_ms", shift.delay_ms, 0.0, 5.0)?;
        check("micro_shift.wet", shift.wet, 0.0, 1.0)?;
        check_guard("micro_shift", shift.guard_low, shift.guard_high)?;

        let detail = &self.micro_detail.params;
        check("micro_detail.max_boost_db", detail.max_boost_db, 0.0, 12.0)?;
        check_guard("micro_detail", detail.guard_low, detail.guard_high)?;

        let masking = &self.masking_dip.params;
        check("masking_dip.max_dip_db", masking.max_dip_db, 0.0, 12.0)?;

        let deess = &self.de_ess.params;
        check("de_ess.ratio", deess.ratio, 1.0, 20.0)?;
        check("de_ess.max_reduction_db", deess.max_reduction_db, 0.0, 24.0)?;

        let harm = &self.harmonics.params;
        check("harmonics.drive", harm.drive, 0.0, 10.0)?;
        check("harmonics.wet", harm.wet, 0.0, 1.0)?;

        let trans = &self.transient_shaper.params;
        check("transient_shaper.max_boost_db", trans.max_boost_db, 0.0, 12.0)?;
        check("transient_shaper.mix", trans.mix, 0.0, 1.0)?;

        let lift = &self.section_lift.params;
        check("section_lift.percentile", lift.percentile, 0.0, 100.0)?;
        check("section_lift.shimmer", lift.shimmer, 0.0, 1.0)?;

        Ok(())
    }
}

fn check(param: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(MasterError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: format!("{} to {}", min, max),
        })
    }
}

fn check_guard(stage: &str, low: f64, high: f64) -> Result<()> {
    check(&format!("{}.guard_low", stage), low, -1.0, 1.0)?;
    check(&format!("{}.guard_high", stage), high, low, 1.0)
}

// ============================================================================
// Overrides
// ============================================================================

/// Job-level settings layered over a preset; `None` keeps the preset value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetOverrides {
    pub target_lufs: Option<f64>,
    pub true_peak_ceiling_db: Option<f64>,
    pub fir_taps: Option<usize>,
    pub eq: Option<bool>,
    pub soft_clip: Option<bool>,
    pub use_stems: Option<bool>,
    pub mono_sub: Option<bool>,
    pub spatial_widen: Option<bool>,
    pub micro_shift: Option<bool>,
    pub micro_detail: Option<bool>,
    pub masking_dip: Option<bool>,
    pub de_ess: Option<bool>,
    pub harmonics: Option<bool>,
    pub transient_shaper: Option<bool>,
    pub section_lift: Option<bool>,
}

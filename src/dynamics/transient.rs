//! Transient contour shaping
//!
//! Fast and slow followers on |mid| expose onsets; their normalised
//! difference drives a boost envelope with instant attack and exponential
//! decay. Material that is already punchy (high crest factor) gets less.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{time_to_coeff, EnvelopeFollower};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{crest_factor_db, db_to_linear, smoothstep};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::MidSide;

/// Keeps the strength ratio defined when the slow follower is at zero
const STRENGTH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientParams {
    pub fast_attack_ms: f64,
    pub fast_release_ms: f64,
    pub slow_attack_ms: f64,
    pub slow_release_ms: f64,
    /// Decay of the boost envelope after an onset
    pub decay_ms: f64,
    pub max_boost_db: f64,
    /// Crest factor range over which treatment fades out
    pub crest_low_db: f64,
    pub crest_high_db: f64,
    /// Wet/dry blend of the shaped mid channel
    pub mix: f64,
}

impl Default for TransientParams {
    fn default() -> Self {
        Self {
            fast_attack_ms: 1.0,
            fast_release_ms: 30.0,
            slow_attack_ms: 20.0,
            slow_release_ms: 200.0,
            decay_ms: 60.0,
            max_boost_db: 2.5,
            crest_low_db: 10.0,
            crest_high_db: 18.0,
            mix: 1.0,
        }
    }
}

impl TransientParams {
    /// 1 for flat material, 0 for material at or above the high crest bound
    pub fn crest_guard(&self, crest_db: f64) -> f64 {
        let span = (self.crest_high_db - self.crest_low_db).max(f64::EPSILON);
        1.0 - smoothstep((crest_db - self.crest_low_db) / span)
    }
}

/// Normalised onset strength in [0, 1] for every sample
pub fn transient_strength(samples: &[f32], params: &TransientParams, sample_rate: u32) -> Vec<f64> {
    let mut fast = EnvelopeFollower::new(params.fast_attack_ms, params.fast_release_ms, sample_rate);
    let mut slow = EnvelopeFollower::new(params.slow_attack_ms, params.slow_release_ms, sample_rate);
    samples
        .iter()
        .map(|&s| {
            let level = (s as f64).abs();
            let f = fast.process(level);
            let sl = slow.process(level);
            ((f - sl) / (sl + STRENGTH_EPSILON)).clamp(0.0, 1.0)
        })
        .collect()
}

/// Peak-hold with instant attack and exponential decay
pub fn boost_envelope(strength: &[f64], decay_ms: f64, sample_rate: u32) -> Vec<f64> {
    let decay = time_to_coeff(decay_ms, sample_rate);
    let mut state = 0.0_f64;
    strength
        .iter()
        .map(|&s| {
            state = s.max(state * decay);
            state
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TransientShaper {
    pub params: TransientParams,
}

impl TransientShaper {
    pub fn new(params: TransientParams) -> Self {
        Self { params }
    }
}

impl Stage for TransientShaper {
    fn name(&self) -> &'static str {
        "transient_shaper"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let mut ms = MidSide::encode(buffer);
        let crest_db = crest_factor_db(&ms.mid);
        let guard = p.crest_guard(crest_db);
        if guard <= 0.0 {
            let report = StageReport::skipped(self.name(), "crest factor above guard")
                .metric("crest_db", crest_db)
                .metric("guard", guard);
            return Ok((buffer.clone(), report));
        }

        let strength = transient_strength(&ms.mid, p, rate);
        let envelope = boost_envelope(&strength, p.decay_ms, rate);
        let mix = p.mix.clamp(0.0, 1.0);

        let mut max_gain_db = 0.0_f64;
        for (mid, &env) in ms.mid.iter_mut().zip(&envelope) {
            let gain_db = p.max_boost_db * env * guard;
            max_gain_db = max_gain_db.max(gain_db);
            let wet = *mid as f64 * db_to_linear(gain_db);
            *mid = ((1.0 - mix) * *mid as f64 + mix * wet) as f32;
        }

        tracing::debug!(crest_db, guard, max_gain_db, "transient shaper");

        let report = StageReport::new(self.name())
            .metric("crest_db", crest_db)
            .metric("guard", guard)
            .metric("max_gain_db", max_gain_db);
        Ok((ms.decode(), report))
    }
}

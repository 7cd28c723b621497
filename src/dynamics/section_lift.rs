//! Section-aware lift
//!
//! Loud sections (choruses, drops) are found from a slow RMS envelope of the
//! mid channel. Inside them a lifted variant of the signal, with a brighter
//! side high band, an air shelf and a little shimmer on the mid channel, is
//! blended in through a smoothed section mask.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::{filter_cascade, high_pass, BiquadCoeffs};
use crate::dsp::envelope::{rms_envelope, EnvelopeFollower};
use crate::dynamics::harmonics::saturation_residual;
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::metrics::percentile_sorted;
use crate::measure::{db_to_linear, linear_to_db};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::MidSide;

/// Drive of the shimmer waveshaper
const SHIMMER_DRIVE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionLiftParams {
    pub rms_window_ms: f64,
    /// Envelope percentile that marks a loud section
    pub percentile: f64,
    pub mask_rise_ms: f64,
    pub mask_fall_ms: f64,
    pub side_high_hz: f64,
    pub side_boost_db: f64,
    pub air_shelf_hz: f64,
    pub air_gain_db: f64,
    pub shimmer: f64,
    /// Envelope levels at or below this never count as a section
    pub floor_db: f64,
}

impl Default for SectionLiftParams {
    fn default() -> Self {
        Self {
            rms_window_ms: 400.0,
            percentile: 75.0,
            mask_rise_ms: 200.0,
            mask_fall_ms: 800.0,
            side_high_hz: 6000.0,
            side_boost_db: 1.5,
            air_shelf_hz: 10000.0,
            air_gain_db: 1.0,
            shimmer: 0.05,
            floor_db: -60.0,
        }
    }
}

/// Smoothed 0..1 mask of loud sections, plus the threshold used (linear)
pub fn section_mask(mid: &[f32], params: &SectionLiftParams, sample_rate: u32) -> (Vec<f64>, f64) {
    let envelope = rms_envelope(mid, params.rms_window_ms, sample_rate);
    let mut sorted = envelope.clone();
    sorted.sort_by(f64::total_cmp);
    let threshold = percentile_sorted(&sorted, params.percentile);
    let floor = db_to_linear(params.floor_db);

    let mask = EnvelopeFollower::new(params.mask_rise_ms, params.mask_fall_ms, sample_rate).scan(
        envelope
            .iter()
            .map(|&env| if env > threshold && env > floor { 1.0 } else { 0.0 }),
    );
    (mask, threshold)
}

#[derive(Debug, Clone, Default)]
pub struct SectionLift {
    pub params: SectionLiftParams,
}

impl SectionLift {
    pub fn new(params: SectionLiftParams) -> Self {
        Self { params }
    }
}

impl Stage for SectionLift {
    fn name(&self) -> &'static str {
        "section_lift"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let mut ms = MidSide::encode(buffer);
        let (mask, threshold) = section_mask(&ms.mid, p, rate);
        let mask_mean = mask.iter().sum::<f64>() / mask.len() as f64;
        if mask.iter().all(|&m| m <= 0.0) {
            let report = StageReport::skipped(self.name(), "no loud sections")
                .metric("threshold_db", linear_to_db(threshold));
            return Ok((buffer.clone(), report));
        }

        // Lifted variant
        let side_high = high_pass(&ms.side, rate, p.side_high_hz);
        let side_gain = db_to_linear(p.side_boost_db) - 1.0;
        let shelf = BiquadCoeffs::high_shelf(rate as f64, p.air_shelf_hz, p.air_gain_db, std::f64::consts::FRAC_1_SQRT_2);
        let mid_shelved = filter_cascade(&ms.mid, &[shelf]);
        let air = high_pass(&ms.mid, rate, p.air_shelf_hz);

        for i in 0..ms.mid.len() {
            let m = mask[i];
            let lifted_side = ms.side[i] as f64 + side_gain * side_high[i] as f64;
            let lifted_mid = mid_shelved[i] as f64 + p.shimmer * saturation_residual(air[i] as f64, SHIMMER_DRIVE);
            ms.side[i] = (ms.side[i] as f64 + m * (lifted_side - ms.side[i] as f64)) as f32;
            ms.mid[i] = (ms.mid[i] as f64 + m * (lifted_mid - ms.mid[i] as f64)) as f32;
        }

        tracing::debug!(threshold_db = linear_to_db(threshold), mask_mean, "section lift");

        let report = StageReport::new(self.name())
            .metric("threshold_db", linear_to_db(threshold))
            .metric("mask_mean", mask_mean);
        Ok((ms.decode(), report))
    }
}

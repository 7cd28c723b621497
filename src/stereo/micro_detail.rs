//! Micro-detail recovery
//!
//! Upward compression of the high side band: quiet ambience and reverb
//! tails below the threshold are lifted by a bounded amount.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::band_top;
use crate::dsp::envelope::{rms_envelope, EnvelopeFollower};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{band_correlation, correlation_guard, db_to_linear, linear_to_db};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::{split_two, MidSide};

/// Window of the level detector
const LEVEL_WINDOW_MS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroDetailParams {
    pub split_hz: f64,
    pub threshold_db: f64,
    /// dB of boost per dB below threshold
    pub ratio: f64,
    pub max_boost_db: f64,
    /// Time for the boost to rise
    pub attack_ms: f64,
    /// Time for the boost to fall
    pub release_ms: f64,
    /// Levels at or below this are silence and never boosted
    pub floor_db: f64,
    pub guard_low: f64,
    pub guard_high: f64,
    pub correlation_high_hz: f64,
}

impl Default for MicroDetailParams {
    fn default() -> Self {
        Self {
            split_hz: 4000.0,
            threshold_db: -38.0,
            ratio: 0.25,
            max_boost_db: 2.0,
            attack_ms: 5.0,
            release_ms: 80.0,
            floor_db: -80.0,
            guard_low: 0.2,
            guard_high: 0.6,
            correlation_high_hz: 16000.0,
        }
    }
}

impl MicroDetailParams {
    /// Static boost curve for a detected level
    pub fn boost_db(&self, level_db: f64) -> f64 {
        if level_db <= self.floor_db {
            return 0.0;
        }
        ((self.threshold_db - level_db) * self.ratio).clamp(0.0, self.max_boost_db)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MicroDetail {
    pub params: MicroDetailParams,
}

impl MicroDetail {
    pub fn new(params: MicroDetailParams) -> Self {
        Self { params }
    }
}

impl Stage for MicroDetail {
    fn name(&self) -> &'static str {
        "micro_detail"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let correlation = band_correlation(
            buffer.left(),
            buffer.right(),
            rate,
            p.split_hz,
            band_top(p.correlation_high_hz, rate),
        );
        let guard = correlation_guard(correlation, p.guard_low, p.guard_high);

        let mut ms = MidSide::encode(buffer);
        let (low, high) = split_two(&ms.side, rate, p.split_hz);
        let level = rms_envelope(&high, LEVEL_WINDOW_MS, rate);

        let smoothed = EnvelopeFollower::new(p.attack_ms, p.release_ms, rate)
            .scan(level.iter().map(|&env| p.boost_db(linear_to_db(env))));

        let mut boost_sum = 0.0;
        let mut boost_max = 0.0_f64;
        for (i, side) in ms.side.iter_mut().enumerate() {
            let boost = guard * smoothed[i];
            boost_sum += boost;
            boost_max = boost_max.max(boost);
            *side = low[i] + high[i] * db_to_linear(boost) as f32;
        }
        let boost_mean = boost_sum / ms.side.len() as f64;

        tracing::debug!(correlation, guard, boost_mean, boost_max, "micro-detail");

        let report = StageReport::new(self.name())
            .metric("correlation", correlation)
            .metric("guard", guard)
            .metric("mean_boost_db", boost_mean)
            .metric("max_boost_db", boost_max);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::rms;
    use test_case::test_case;

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) as f32
            })
            .collect()
    }

    #[test_case(-30.0 => 0.0; "above threshold")]
    #[test_case(-42.0 => 1.0; "proportional")]
    #[test_case(-60.0 => 2.0; "capped")]
    #[test_case(-90.0 => 0.0; "below floor")]
    fn test_boost_curve(level_db: f64) -> f64 {
        MicroDetailParams::default().boost_db(level_db)
    }

    #[test]
    fn test_lifts_quiet_side_detail() {
        let common = noise(48000, 20);
        let detail = noise(48000, 21);
        let left: Vec<f32> = common.iter().zip(&detail).map(|(c, d)| c + 0.003 * d).collect();
        let right: Vec<f32> = common.iter().zip(&detail).map(|(c, d)| c - 0.003 * d).collect();
        let buffer = AudioBuffer::from_stereo(left, right, 48000).unwrap();

        let (out, report) = MicroDetail::default().process(&buffer, &StageContext::default()).unwrap();
        assert!(report.get("guard").unwrap() > 0.99);
        assert!((report.get("max_boost_db").unwrap() - 2.0).abs() < 0.01);

        let before = rms(&split_two(&MidSide::encode(&buffer).side, 48000, 4000.0).1[4800..]);
        let after = rms(&split_two(&MidSide::encode(&out).side, 48000, 4000.0).1[4800..]);
        assert!(after / before > 1.15, "high side rms ratio {}", after / before);
    }

    #[test]
    fn test_mono_stays_mono() {
        let buffer = AudioBuffer::from_mono(noise(24000, 22), 48000);
        let (out, report) = MicroDetail::default().process(&buffer, &StageContext::default()).unwrap();
        assert_eq!(out, buffer);
        assert_eq!(report.get("max_boost_db"), Some(0.0));
    }
}

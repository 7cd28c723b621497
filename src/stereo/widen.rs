//! Frequency-dependent side widening
//!
//! The side channel is split into low/mid/high bands; mid and high are scaled
//! by width factors that the L/R correlation guard pulls back towards unity
//! on material that is already wide.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::band_top;
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{band_correlation, correlation_guard};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::{split_three, MidSide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidenParams {
    pub low_split_hz: f64,
    pub high_split_hz: f64,
    /// Side gain of the band between the splits
    pub mid_width: f64,
    /// Side gain above the high split
    pub high_width: f64,
    /// Correlation below which widening is off
    pub guard_low: f64,
    /// Correlation above which widening is fully on
    pub guard_high: f64,
    /// Band measured for the guard
    pub correlation_low_hz: f64,
    pub correlation_high_hz: f64,
}

impl Default for WidenParams {
    fn default() -> Self {
        Self {
            low_split_hz: 300.0,
            high_split_hz: 4000.0,
            mid_width: 1.10,
            high_width: 1.20,
            guard_low: 0.2,
            guard_high: 0.6,
            correlation_low_hz: 300.0,
            correlation_high_hz: 16000.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpatialWiden {
    pub params: WidenParams,
}

impl SpatialWiden {
    pub fn new(params: WidenParams) -> Self {
        Self { params }
    }
}

impl Stage for SpatialWiden {
    fn name(&self) -> &'static str {
        "spatial_widen"
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
            p.correlation_low_hz,
            band_top(p.correlation_high_hz, rate),
        );
        let guard = correlation_guard(correlation, p.guard_low, p.guard_high);
        let mid_width = 1.0 + (p.mid_width - 1.0) * guard;
        let high_width = 1.0 + (p.high_width - 1.0) * guard;

        let mut ms = MidSide::encode(buffer);
        let bands = split_three(&ms.side, rate, p.low_split_hz, p.high_split_hz);
        let (wm, wh) = (mid_width as f32, high_width as f32);
        for (i, side) in ms.side.iter_mut().enumerate() {
            *side = bands.low[i] + wm * bands.mid[i] + wh * bands.high[i];
        }

        tracing::debug!(correlation, guard, mid_width, high_width, "spatial widen");

        let report = StageReport::new(self.name())
            .metric("correlation", correlation)
            .metric("guard", guard)
            .metric("mid_width", mid_width)
            .metric("high_width", high_width);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::rms;

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

    #[test]
    fn test_widens_correlated_material() {
        let common = noise(48000, 1);
        let diff = noise(48000, 2);
        let left: Vec<f32> = common.iter().zip(&diff).map(|(c, d)| c + 0.1 * d).collect();
        let right: Vec<f32> = common.iter().zip(&diff).map(|(c, d)| c - 0.1 * d).collect();
        let buffer = AudioBuffer::from_stereo(left, right, 48000).unwrap();

        let (out, report) = SpatialWiden::default()
            .process(&buffer, &StageContext::default())
            .unwrap();
        assert!(report.get("guard").unwrap() > 0.99);
        let before = rms(&MidSide::encode(&buffer).side);
        let after = rms(&MidSide::encode(&out).side);
        assert!(after > 1.05 * before, "side rms {} -> {}", before, after);
    }

    #[test]
    fn test_guard_disables_on_wide_material() {
        let buffer = AudioBuffer::from_stereo(noise(48000, 3), noise(48000, 4), 48000).unwrap();
        let (out, report) = SpatialWiden::default()
            .process(&buffer, &StageContext::default())
            .unwrap();
        assert_eq!(report.get("guard"), Some(0.0));
        for ch in 0..2 {
            for (a, b) in out.channel(ch).iter().zip(buffer.channel(ch)) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_mono_stays_mono() {
        let buffer = AudioBuffer::from_mono(noise(24000, 5), 48000);
        let (out, _) = SpatialWiden::default()
            .process(&buffer, &StageContext::default())
            .unwrap();
        assert_eq!(MidSide::encode(&out).side_energy(), 0.0);
    }
}

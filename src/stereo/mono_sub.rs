//! Adaptive sub-bass mono anchoring
//!
//! Finds the dominant sub fundamental on the mid channel, derives a side
//! high-pass corner from it and blends the high-passed side back in with a
//! strength that grows with how much sub energy sits in the side channel.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::{high_pass4, low_pass};
use crate::dsp::spectrum::{average_magnitude_spectrum, bin_frequencies};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{rms, smoothstep, ENERGY_EPSILON};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::MidSide;

/// Transform size of the fundamental search
pub const SUB_ANALYSIS_FFT_SIZE: usize = 16384;

/// Spectral peaks at or below this magnitude are treated as no sub content
const MIN_PEAK_MAGNITUDE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoSubParams {
    /// Fundamental search band (Hz)
    pub search_low_hz: f64,
    pub search_high_hz: f64,
    /// Cutoff = fundamental x multiplier, clamped to the cutoff range
    pub cutoff_multiplier: f64,
    pub min_cutoff_hz: f64,
    pub max_cutoff_hz: f64,
    /// Used when no sub fundamental is found
    pub default_cutoff_hz: f64,
    /// Side/mid low-band RMS ratios mapped to the strength range
    pub ratio_low: f64,
    pub ratio_high: f64,
    pub min_strength: f64,
    pub max_strength: f64,
}

impl Default for MonoSubParams {
    fn default() -> Self {
        Self {
            search_low_hz: 28.0,
            search_high_hz: 85.0,
            cutoff_multiplier: 1.8,
            min_cutoff_hz: 80.0,
            max_cutoff_hz: 140.0,
            default_cutoff_hz: 110.0,
            ratio_low: 0.1,
            ratio_high: 0.6,
            min_strength: 0.5,
            max_strength: 1.0,
        }
    }
}

/// Strongest spectral peak of `mid` inside `[low_hz, high_hz]`, if any
pub fn estimate_sub_fundamental(mid: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> Result<Option<f64>> {
    if mid.is_empty() {
        return Ok(None);
    }
    let magnitudes = average_magnitude_spectrum(mid, SUB_ANALYSIS_FFT_SIZE)?;
    let freqs = bin_frequencies(SUB_ANALYSIS_FFT_SIZE, sample_rate);

    let best = freqs
        .iter()
        .zip(&magnitudes)
        .filter(|(f, _)| (low_hz..=high_hz).contains(*f))
        .max_by(|a, b| a.1.total_cmp(b.1));

    Ok(match best {
        Some((&freq, &mag)) if mag > MIN_PEAK_MAGNITUDE => Some(freq),
        _ => None,
    })
}

#[derive(Debug, Clone, Default)]
pub struct MonoSub {
    pub params: MonoSubParams,
}

impl MonoSub {
    pub fn new(params: MonoSubParams) -> Self {
        Self { params }
    }

    fn cutoff_for(&self, fundamental: Option<f64>) -> f64 {
        let p = &self.params;
        match fundamental {
            Some(f0) => (f0 * p.cutoff_multiplier).clamp(p.min_cutoff_hz, p.max_cutoff_hz),
            None => p.default_cutoff_hz,
        }
    }

    fn strength_for(&self, ratio: f64) -> f64 {
        let p = &self.params;
        let span = (p.ratio_high - p.ratio_low).max(f64::EPSILON);
        p.min_strength + (p.max_strength - p.min_strength) * smoothstep((ratio - p.ratio_low) / span)
    }
}

impl Stage for MonoSub {
    fn name(&self) -> &'static str {
        "mono_sub"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let rate = buffer.sample_rate;
        let mut ms = MidSide::encode(buffer);
        let fundamental =
            estimate_sub_fundamental(&ms.mid, rate, self.params.search_low_hz, self.params.search_high_hz)?;
        let cutoff = self.cutoff_for(fundamental);

        let side_low = rms(&low_pass(&ms.side, rate, cutoff));
        let mid_low = rms(&low_pass(&ms.mid, rate, cutoff));
        let ratio = if mid_low * mid_low < ENERGY_EPSILON {
            // No mid sub to anchor against: any side sub counts as unstable
            if side_low * side_low < ENERGY_EPSILON {
                0.0
            } else {
                self.params.ratio_high
            }
        } else {
            side_low / mid_low
        };
        let strength = self.strength_for(ratio);

        let filtered = high_pass4(&ms.side, rate, cutoff);
        let s = strength as f32;
        for (side, hp) in ms.side.iter_mut().zip(&filtered) {
            *side = s * hp + (1.0 - s) * *side;
        }

        tracing::debug!(
            fundamental_hz = fundamental.unwrap_or(0.0),
            cutoff_hz = cutoff,
            ratio,
            strength,
            "mono-sub"
        );

        let report = StageReport::new(self.name())
            .metric("fundamental_hz", fundamental.unwrap_or(0.0))
            .metric("cutoff_hz", cutoff)
            .metric("side_mid_ratio", ratio)
            .metric("strength", strength);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn sine(freq: f64, amp: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amp * (2.0 * PI * freq * i as f64 / 48000.0).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_fundamental_found_in_band() {
        let mid = sine(55.0, 0.5, 48000);
        let f0 = estimate_sub_fundamental(&mid, 48000, 28.0, 85.0).unwrap().unwrap();
        // 16384-point bins are ~2.9 Hz wide at 48 kHz
        assert!((f0 - 55.0).abs() < 3.0, "found {}", f0);
    }

    #[test]
    fn test_no_fundamental_in_silence() {
        let mid = vec![0.0; 20000];
        assert_eq!(estimate_sub_fundamental(&mid, 48000, 28.0, 85.0).unwrap(), None);
    }

    #[test]
    fn test_cutoff_and_strength_mapping() {
        let stage = MonoSub::default();
        assert_relative_eq!(stage.cutoff_for(Some(60.0)), 108.0, epsilon = 1e-9);
        assert_eq!(stage.cutoff_for(Some(30.0)), 80.0);
        assert_eq!(stage.cutoff_for(Some(85.0)), 140.0);
        assert_eq!(stage.cutoff_for(None), 110.0);

        assert_eq!(stage.strength_for(0.0), 0.5);
        assert_eq!(stage.strength_for(1.0), 1.0);
        assert_relative_eq!(stage.strength_for(0.35), 0.75, epsilon = 1e-9);
    }

    #[test]
    fn test_reduces_side_sub() {
        let len = 48000;
        let bass = sine(50.0, 0.4, len);
        let wobble = sine(50.0, 0.3, len);
        let left: Vec<f32> = bass.iter().zip(&wobble).map(|(b, w)| b + w).collect();
        let right: Vec<f32> = bass.iter().zip(&wobble).map(|(b, w)| b - w).collect();
        let buffer = AudioBuffer::from_stereo(left, right, 48000).unwrap();

        let (out, report) = MonoSub::default().process(&buffer, &StageContext::default()).unwrap();
        let before = MidSide::encode(&buffer).side_energy();
        let after = MidSide::encode(&out).side_energy();
        assert!(after < 0.5 * before, "side energy {} -> {}", before, after);
        assert_eq!(report.get("strength"), Some(1.0));
    }

    #[test]
    fn test_mono_input_unchanged() {
        let buffer = AudioBuffer::from_mono(sine(45.0, 0.5, 24000), 48000);
        let (out, _) = MonoSub::default().process(&buffer, &StageContext::default()).unwrap();
        assert_eq!(out, buffer);
    }
}

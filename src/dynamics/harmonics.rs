//! Harmonic enhancement
//!
//! A band of the mid channel goes through a tanh waveshaper; only the
//! harmonic residual (shaped minus clean) is mixed back, so the band's
//! fundamental level is untouched at low drive.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::{band_pass, band_top};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::rms;
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::MidSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicsParams {
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub drive: f64,
    pub wet: f64,
}

impl Default for HarmonicsParams {
    fn default() -> Self {
        Self {
            band_low_hz: 1500.0,
            band_high_hz: 6000.0,
            drive: 2.0,
            wet: 0.15,
        }
    }
}

/// Odd-symmetric saturation residual: `tanh(drive * x) / drive - x`
#[inline]
pub fn saturation_residual(x: f64, drive: f64) -> f64 {
    if drive <= 0.0 {
        return 0.0;
    }
    (drive * x).tanh() / drive - x
}

#[derive(Debug, Clone, Default)]
pub struct HarmonicExciter {
    pub params: HarmonicsParams,
}

impl HarmonicExciter {
    pub fn new(params: HarmonicsParams) -> Self {
        Self { params }
    }
}

impl Stage for HarmonicExciter {
    fn name(&self) -> &'static str {
        "harmonics"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let mut ms = MidSide::encode(buffer);
        let band = band_pass(&ms.mid, rate, p.band_low_hz, band_top(p.band_high_hz, rate));

        let residual: Vec<f32> = band
            .iter()
            .map(|&x| (p.wet * saturation_residual(x as f64, p.drive)) as f32)
            .collect();
        for (mid, r) in ms.mid.iter_mut().zip(&residual) {
            *mid += r;
        }
        let residual_rms = rms(&residual);

        tracing::debug!(residual_rms, "harmonics");

        let report = StageReport::new(self.name())
            .metric("drive", p.drive)
            .metric("wet", p.wet)
            .metric("residual_rms", residual_rms);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_residual_is_odd_and_bounded() {
        for &x in &[0.01, 0.3, 0.9, 3.0] {
            assert_relative_eq!(saturation_residual(x, 2.0), -saturation_residual(-x, 2.0));
            // Shaped output never exceeds 1 / drive in magnitude
            assert!((saturation_residual(x, 2.0) + x).abs() <= 0.5);
        }
        assert_eq!(saturation_residual(0.0, 2.0), 0.0);
        assert_eq!(saturation_residual(0.5, 0.0), 0.0);
    }

    #[test]
    fn test_adds_residual_to_band() {
        let signal: Vec<f32> = (0..24000)
            .map(|i| (0.5 * (2.0 * PI * 3000.0 * i as f64 / 48000.0).sin()) as f32)
            .collect();
        let buffer = AudioBuffer::from_mono(signal, 48000);
        let (out, report) = HarmonicExciter::default()
            .process(&buffer, &StageContext::default())
            .unwrap();
        assert!(report.get("residual_rms").unwrap() > 1e-3);
        assert_ne!(out, buffer);
        assert_eq!(out.left(), out.right());
    }

    #[test]
    fn test_silence_stays_silent() {
        let buffer = AudioBuffer::new(4800, 48000);
        let (out, _) = HarmonicExciter::default()
            .process(&buffer, &StageContext::default())
            .unwrap();
        assert!(out.is_silent());
    }
}

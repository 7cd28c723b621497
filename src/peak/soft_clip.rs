//! Oversampled soft clipper
//!
//! Shaves peaks just below the ceiling before the limiter sees them. The
//! knee runs at 4x so its harmonics are filtered by the decimator, and only
//! the clipping residual is brought back to the base rate: material below the
//! knee passes through bit-exact.

use serde::{Deserialize, Serialize};

use crate::dsp::oversample::Oversampler;
use crate::engine::AudioBuffer;
use crate::measure::{buffer_peak, db_to_linear, linear_to_db};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftClipParams {
    /// Knee threshold distance below the ceiling (dB)
    pub knee_db: f64,
    /// Gain into the knee, removed again after it (dB)
    pub drive_db: f64,
    /// Blend of the clipped residual
    pub mix: f64,
    pub oversample: usize,
}

impl Default for SoftClipParams {
    fn default() -> Self {
        Self {
            knee_db: 1.5,
            drive_db: 0.0,
            mix: 1.0,
            oversample: 4,
        }
    }
}

/// Soft knee: linear up to `threshold`, tanh approach to `ceiling` above it
///
/// Value and first derivative are continuous at the threshold.
#[inline]
pub fn soft_knee(x: f64, threshold: f64, ceiling: f64) -> f64 {
    let mag = x.abs();
    if mag <= threshold {
        return x;
    }
    let span = ceiling - threshold;
    if span <= 0.0 {
        return threshold.copysign(x);
    }
    (threshold + span * ((mag - threshold) / span).tanh()).copysign(x)
}

/// What the clipper did to one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SoftClipStats {
    /// Fraction of oversampled samples above the knee
    pub clipped_fraction: f64,
    /// Sample peak change (dB, zero or negative)
    pub peak_change_db: f64,
}

#[derive(Debug, Clone)]
pub struct SoftClipper {
    params: SoftClipParams,
    ceiling: f64,
    threshold: f64,
    oversampler: Oversampler,
}

impl SoftClipper {
    pub fn new(params: SoftClipParams, ceiling_db: f64) -> Self {
        let ceiling = db_to_linear(ceiling_db);
        Self {
            params,
            ceiling,
            threshold: ceiling * db_to_linear(-params.knee_db.max(0.0)),
            oversampler: Oversampler::new(params.oversample, crate::dsp::oversample::DEFAULT_TAPS_PER_PHASE),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn process(&self, buffer: &AudioBuffer) -> (AudioBuffer, SoftClipStats) {
        if buffer.is_empty() {
            return (buffer.clone(), SoftClipStats::default());
        }

        let drive = db_to_linear(self.params.drive_db);
        let mix = self.params.mix.clamp(0.0, 1.0);
        let mut output = buffer.clone();
        let mut clipped = 0usize;
        let mut total = 0usize;

        for ch in 0..buffer.channels() {
            let up = self.oversampler.upsample(buffer.channel(ch));
            total += up.len();
            let mut any = false;
            let residual: Vec<f64> = up
                .iter()
                .map(|&u| {
                    let z = u * drive;
                    if z.abs() > self.threshold {
                        clipped += 1;
                        any = true;
                        (soft_knee(z, self.threshold, self.ceiling) - z) / drive
                    } else {
                        0.0
                    }
                })
                .collect();
            if !any {
                continue;
            }

            let down = self.oversampler.downsample(&residual);
            for (dst, r) in output.channel_mut(ch).iter_mut().zip(down) {
                *dst = (*dst as f64 + mix * r) as f32;
            }
        }

        let stats = SoftClipStats {
            clipped_fraction: clipped as f64 / total.max(1) as f64,
            peak_change_db: linear_to_db(buffer_peak(&output)) - linear_to_db(buffer_peak(buffer)),
        };
        (output, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn sine(amp: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amp * (2.0 * PI * 997.0 * i as f64 / 48000.0).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_knee_shape() {
        let (t, c) = (0.8, 1.0);
        assert_eq!(soft_knee(0.5, t, c), 0.5);
        assert_eq!(soft_knee(-0.8, t, c), -0.8);
        assert!(soft_knee(1.0, t, c) < c);
        assert!(soft_knee(5.0, t, c) <= c);
        assert_relative_eq!(soft_knee(-5.0, t, c), -soft_knee(5.0, t, c));

        // Slope is ~1 just above the knee
        let h = 1e-6;
        let slope = (soft_knee(t + 2.0 * h, t, c) - soft_knee(t + h, t, c)) / h;
        assert!((slope - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_quiet_material_is_bit_exact() {
        let buffer = AudioBuffer::from_mono(sine(0.3, 4800), 48000);
        let (out, stats) = SoftClipper::new(SoftClipParams::default(), -1.0).process(&buffer);
        assert_eq!(out, buffer);
        assert_eq!(stats.clipped_fraction, 0.0);
    }

    #[test]
    fn test_hot_material_is_reduced() {
        let buffer = AudioBuffer::from_mono(sine(1.2, 9600), 48000);
        let (out, stats) = SoftClipper::new(SoftClipParams::default(), -1.0).process(&buffer);
        assert!(stats.clipped_fraction > 0.1);
        assert!(stats.peak_change_db < -1.0);
        assert!(out.is_finite());
    }

    #[test]
    fn test_threshold_sits_below_ceiling() {
        let clipper = SoftClipper::new(SoftClipParams::default(), -1.0);
        assert_relative_eq!(linear_to_db(clipper.threshold()), -2.5, epsilon = 1e-9);
    }
}

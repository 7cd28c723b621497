//! Measurement Utilities
//!
//! Pure functions over buffers and sample slices:
//! - Level conversions and RMS/peak/crest statistics
//! - Approximate integrated loudness (gated, K-weighted)
//! - Oversampled true-peak estimation
//! - Band correlation and the correlation guard

pub mod correlation;
pub mod loudness;
pub mod metrics;
pub mod true_peak;

pub use correlation::{band_correlation, correlation_guard, pearson};
pub use loudness::{integrated_loudness, LOUDNESS_FLOOR_LUFS};
pub use metrics::ProgramMetrics;
pub use true_peak::{true_peak, true_peak_db};

use crate::engine::AudioBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Level reported for zero or negligible amplitudes
pub const MIN_DB: f64 = -200.0;

/// Energies below this (per sample) are treated as silence
pub const ENERGY_EPSILON: f64 = 1e-12;

// ============================================================================
// Level Helpers
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at [`MIN_DB`]
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 || !linear.is_finite() {
        MIN_DB
    } else {
        (20.0 * linear.log10()).max(MIN_DB)
    }
}

/// Root mean square of a slice (0.0 for an empty slice)
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Mean square of a slice (0.0 for an empty slice)
pub fn mean_square(samples: &[f32]) -> f64 {
    let r = rms(samples);
    r * r
}

/// Absolute sample peak of a slice
pub fn peak(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0_f64, |m, &s| m.max((s as f64).abs()))
}

/// Absolute sample peak across both channels of a buffer
pub fn buffer_peak(buffer: &AudioBuffer) -> f64 {
    buffer
        .samples
        .iter()
        .map(|channel| peak(channel))
        .fold(0.0_f64, f64::max)
}

/// Peak-to-RMS ratio in dB; 0.0 for silence
pub fn crest_factor_db(samples: &[f32]) -> f64 {
    let r = rms(samples);
    if r * r < ENERGY_EPSILON {
        return 0.0;
    }
    linear_to_db(peak(samples) / r)
}

/// Mid channel, (L + R) / 2
pub fn mid_signal(buffer: &AudioBuffer) -> Vec<f32> {
    buffer
        .left()
        .iter()
        .zip(buffer.right())
        .map(|(&l, &r)| 0.5 * (l + r))
        .collect()
}

/// Smooth 0..1 ramp with zero slope at both ends
#[inline]
pub fn smoothstep(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let t = x.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversions() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-6.0), 0.501187, epsilon = 1e-6);
        assert_relative_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-4);
        assert_eq!(linear_to_db(0.0), MIN_DB);
        assert_eq!(linear_to_db(f64::NAN), MIN_DB);
    }

    #[test]
    fn test_rms_peak_crest() {
        let square = [0.5_f32, -0.5, 0.5, -0.5];
        assert_relative_eq!(rms(&square), 0.5);
        assert_relative_eq!(peak(&square), 0.5);
        assert_relative_eq!(crest_factor_db(&square), 0.0, epsilon = 1e-9);
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(crest_factor_db(&[0.0; 16]), 0.0);
    }

    #[test]
    fn test_mid_signal() {
        let buffer = AudioBuffer::from_stereo(vec![1.0, 0.0], vec![0.0, -1.0], 48000).unwrap();
        assert_eq!(mid_signal(&buffer), vec![0.5, -0.5]);
    }

    #[test]
    fn test_smoothstep() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(2.0), 1.0);
        assert_eq!(smoothstep(f64::NAN), 0.0);
    }
}

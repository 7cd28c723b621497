//! Oversampled true-peak estimation
//!
//! Inter-sample peaks are found by 4x polyphase interpolation. The estimate
//! never reads below the sample peak.

use crate::dsp::oversample::Oversampler;
use crate::engine::AudioBuffer;
use crate::measure::{linear_to_db, peak};

/// Estimated true peak of a single channel (linear)
pub fn channel_true_peak(samples: &[f32], oversampler: &Oversampler) -> f64 {
    let interpolated = oversampler
        .upsample(samples)
        .iter()
        .fold(0.0_f64, |m, &s| m.max(s.abs()));
    interpolated.max(peak(samples))
}

/// Estimated true peak across both channels (linear)
pub fn true_peak(buffer: &AudioBuffer) -> f64 {
    let oversampler = Oversampler::default();
    buffer
        .samples
        .iter()
        .map(|channel| channel_true_peak(channel, &oversampler))
        .fold(0.0_f64, f64::max)
}

/// Estimated true peak across both channels in dBTP
pub fn true_peak_db(buffer: &AudioBuffer) -> f64 {
    linear_to_db(true_peak(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MIN_DB;

    #[test]
    fn test_true_peak_at_least_sample_peak() {
        let buffer = AudioBuffer::from_stereo(vec![0.0, 0.9, 0.0], vec![0.0, -0.3, 0.0], 48000)
            .unwrap();
        assert!(true_peak(&buffer) >= f64::from(0.9_f32));
    }

    #[test]
    fn test_intersample_overshoot_detected() {
        // fs/4 sine at 45 degrees: every sample is 0.707 of the waveform peak
        let samples: Vec<f32> = (0..4800)
            .map(|i| {
                (std::f64::consts::FRAC_PI_2 * i as f64 + std::f64::consts::FRAC_PI_4).sin() as f32
                    * 0.5
            })
            .collect();
        let buffer = AudioBuffer::from_mono(samples, 48000);
        let sample_peak_db = linear_to_db(crate::measure::buffer_peak(&buffer));
        let tp_db = true_peak_db(&buffer);
        assert!(
            tp_db > sample_peak_db + 2.5,
            "expected ~3 dB overshoot, sample {:.2} dB vs true {:.2} dB",
            sample_peak_db,
            tp_db
        );
    }

    #[test]
    fn test_silence_is_floor() {
        let buffer = AudioBuffer::new(1000, 48000);
        assert_eq!(true_peak(&buffer), 0.0);
        assert_eq!(true_peak_db(&buffer), MIN_DB);
    }
}

//! FFT helpers
//!
//! Thin wrappers over `realfft` used by curve analysis, filter design and
//! the convolution engine. All transforms run in f64.

use num_complex::Complex;
use realfft::RealFftPlanner;
use std::f64::consts::PI;

use crate::error::{MasterError, Result};

pub(crate) fn fft_error(e: impl std::fmt::Display) -> MasterError {
    MasterError::ProcessingError {
        reason: format!("FFT failed: {}", e),
    }
}

/// Symmetric Hann window of length `n`
pub fn hann(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
            .collect(),
    }
}

/// Next power of two at or above `n` (1 for 0)
#[inline]
pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Frequency in Hz of each bin of an `n_fft` real transform
pub fn bin_frequencies(n_fft: usize, sample_rate: u32) -> Vec<f64> {
    let bins = n_fft / 2 + 1;
    let step = sample_rate as f64 / n_fft as f64;
    (0..bins).map(|k| k as f64 * step).collect()
}

/// Mean magnitude spectrum over Hann-windowed frames with 50% overlap
///
/// Inputs shorter than one frame are zero-padded to a single frame. Returns
/// `n_fft / 2 + 1` magnitudes.
pub fn average_magnitude_spectrum(samples: &[f32], n_fft: usize) -> Result<Vec<f64>> {
    let bins = n_fft / 2 + 1;
    let hop = (n_fft / 2).max(1);
    let window = hann(n_fft);

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_fft);
    let mut frame = r2c.make_input_vec();
    let mut spectrum = r2c.make_output_vec();
    let mut accum = vec![0.0; bins];

    let starts: Vec<usize> = if samples.len() <= n_fft {
        vec![0]
    } else {
        (0..=samples.len() - n_fft).step_by(hop).collect()
    };

    for &start in &starts {
        for (i, slot) in frame.iter_mut().enumerate() {
            let s = samples.get(start + i).copied().unwrap_or(0.0) as f64;
            *slot = s * window[i];
        }
        r2c.process(&mut frame, &mut spectrum).map_err(fft_error)?;
        for (acc, c) in accum.iter_mut().zip(&spectrum) {
            *acc += c.norm();
        }
    }

    let count = starts.len() as f64;
    Ok(accum.into_iter().map(|m| m / count).collect())
}

/// Forward real FFT of `input` zero-padded to `n_fft`
pub fn forward_padded(input: &[f64], n_fft: usize) -> Result<Vec<Complex<f64>>> {
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_fft);
    let mut buffer = r2c.make_input_vec();
    for (slot, &v) in buffer.iter_mut().zip(input) {
        *slot = v;
    }
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buffer, &mut spectrum).map_err(fft_error)?;
    Ok(spectrum)
}

/// Inverse real FFT of a real-valued (zero-phase) spectrum, normalised by `n_fft`
pub fn inverse_real(gains: &[f64], n_fft: usize) -> Result<Vec<f64>> {
    let mut planner = RealFftPlanner::<f64>::new();
    let c2r = planner.plan_fft_inverse(n_fft);
    let mut spectrum = c2r.make_input_vec();
    for (slot, &g) in spectrum.iter_mut().zip(gains) {
        *slot = Complex::new(g, 0.0);
    }
    let mut output = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut output).map_err(fft_error)?;
    let norm = 1.0 / n_fft as f64;
    Ok(output.into_iter().map(|v| v * norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(1024), 1024);
    }

    #[test]
    fn test_hann_endpoints() {
        let w = hann(5);
        assert!(w[0].abs() < 1e-12 && w[4].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spectrum_peak_at_tone_bin() {
        let n_fft = 1024;
        // Bin 64 at 48 kHz / 1024
        let freq = 64.0 * 48000.0 / n_fft as f64;
        let samples: Vec<f32> = (0..8192)
            .map(|i| (2.0 * PI * freq * i as f64 / 48000.0).sin() as f32)
            .collect();
        let mags = average_magnitude_spectrum(&samples, n_fft).unwrap();
        assert_eq!(mags.len(), 513);
        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 64);
    }

    #[test]
    fn test_short_input_single_frame() {
        let mags = average_magnitude_spectrum(&[1.0, 0.5], 256).unwrap();
        assert_eq!(mags.len(), 129);
        assert!(mags.iter().all(|m| m.is_finite()));
    }

    #[test]
    fn test_inverse_of_flat_spectrum_is_impulse() {
        let impulse = inverse_real(&vec![1.0; 33], 64).unwrap();
        assert!((impulse[0] - 1.0).abs() < 1e-12);
        assert!(impulse[1..].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_forward_of_impulse_is_flat() {
        let spectrum = forward_padded(&[1.0], 16).unwrap();
        assert_eq!(spectrum.len(), 9);
        assert!(spectrum.iter().all(|c| (c.re - 1.0).abs() < 1e-12 && c.im.abs() < 1e-12));
    }
}

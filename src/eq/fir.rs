//! Linear-phase FIR design by frequency sampling
//!
//! The curve is sampled on a dense grid, inverse transformed as a zero-phase
//! response, centred and Hann-windowed. Taps are exactly symmetric, so the
//! group delay is `(taps - 1) / 2` samples at every frequency.

use sha2::{Digest, Sha256};

use crate::dsp::spectrum::{inverse_real, next_pow2};
use crate::eq::curve::FrequencyCurve;
use crate::error::{MasterError, Result};
use crate::measure::db_to_linear;

/// Smallest filter the designer will produce
pub const MIN_TAPS: usize = 3;

/// Largest filter the designer will produce
pub const MAX_TAPS: usize = 65535;

/// Smallest frequency-sampling grid
const MIN_DESIGN_GRID: usize = 4096;

/// Force a tap count odd (even counts are rounded up) and into range
pub fn odd_taps(taps: usize) -> usize {
    let taps = taps.clamp(MIN_TAPS, MAX_TAPS);
    if taps % 2 == 0 {
        taps + 1
    } else {
        taps
    }
}

/// Odd-length FIR filter with a stable fingerprint of its coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct FirFilter {
    taps: Vec<f64>,
    fingerprint: String,
}

impl FirFilter {
    /// Wrap existing coefficients
    ///
    /// # Errors
    /// `InvalidParameter` for an even or empty tap list or non-finite taps.
    pub fn from_taps(taps: Vec<f64>) -> Result<Self> {
        if taps.is_empty() || taps.len() % 2 == 0 {
            return Err(MasterError::InvalidParameter {
                param: "taps".to_string(),
                value: taps.len().to_string(),
                expected: "an odd, non-zero tap count".to_string(),
            });
        }
        if taps.iter().any(|t| !t.is_finite()) {
            return Err(MasterError::InvalidParameter {
                param: "taps".to_string(),
                value: "NaN/Inf".to_string(),
                expected: "finite coefficients".to_string(),
            });
        }

        let fingerprint = fingerprint(&taps);
        Ok(Self { taps, fingerprint })
    }

    /// Identity filter of the given (odd) length: a centred unit impulse
    pub fn identity(taps: usize) -> Result<Self> {
        let len = odd_taps(taps);
        let mut coeffs = vec![0.0; len];
        coeffs[(len - 1) / 2] = 1.0;
        Self::from_taps(coeffs)
    }

    /// Design a linear-phase filter from a gain curve
    ///
    /// `taps` is forced odd; `sample_rate` maps the curve's Hz axis onto the
    /// design grid.
    pub fn design(curve: &FrequencyCurve, taps: usize, sample_rate: u32) -> Result<Self> {
        let len = odd_taps(taps);
        let centre = (len - 1) / 2;
        let grid = MIN_DESIGN_GRID.max(next_pow2(4 * len));
        let bin_hz = sample_rate as f64 / grid as f64;

        let gains: Vec<f64> = (0..=grid / 2)
            .map(|k| db_to_linear(curve.gain_at(k as f64 * bin_hz)))
            .collect();
        let zero_phase = inverse_real(&gains, grid)?;

        // Hann window without zero endpoints so every tap contributes
        let window = |n: usize| {
            0.5 - 0.5 * (2.0 * std::f64::consts::PI * (n + 1) as f64 / (len + 1) as f64).cos()
        };

        let mut coeffs = vec![0.0; len];
        coeffs[centre] = zero_phase[0] * window(centre);
        for j in 1..=centre {
            // Average the two halves so symmetry is exact
            let v = 0.5 * (zero_phase[j] + zero_phase[grid - j]) * window(centre + j);
            coeffs[centre + j] = v;
            coeffs[centre - j] = v;
        }

        Self::from_taps(coeffs)
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Group delay in samples
    pub fn delay(&self) -> usize {
        (self.taps.len() - 1) / 2
    }

    /// Hex SHA-256 of the coefficient bytes
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Magnitude response in dB at `freq_hz`, evaluated directly from the taps
    pub fn response_db(&self, freq_hz: f64, sample_rate: u32) -> f64 {
        let w = 2.0 * std::f64::consts::PI * freq_hz / sample_rate as f64;
        let (re, im) = self
            .taps
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(re, im), (n, &h)| {
                (re + h * (w * n as f64).cos(), im - h * (w * n as f64).sin())
            });
        crate::measure::linear_to_db((re * re + im * im).sqrt())
    }
}

fn fingerprint(taps: &[f64]) -> String {
    let mut hasher = Sha256::new();
    for tap in taps {
        hasher.update(tap.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

//! EQ target curve design
//!
//! Builds a dB-vs-frequency curve either by matching the average spectrum of
//! a reference or from a fixed translation curve, then shapes it with
//! smoothing, strength, a high-frequency multiplier and two guardrails.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::moving_average;
use crate::dsp::spectrum::{average_magnitude_spectrum, bin_frequencies};
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::measure::mid_signal;

// ============================================================================
// Constants
// ============================================================================

/// Analysis frame size for spectrum averaging
pub const ANALYSIS_FFT_SIZE: usize = 4096;

/// Magnitude floor added before taking spectrum ratios
const MAGNITUDE_EPSILON: f64 = 1e-9;

/// Bins above this frequency are scaled by the high-frequency multiplier
const HF_SPLIT_HZ: f64 = 2000.0;

/// Cut limit starts to relax above this frequency
const FLOOR_START_HZ: f64 = 8000.0;
/// Frequency at which the relaxed cut limit is fully reached
const FLOOR_END_HZ: f64 = 16000.0;
/// Deepest cut allowed at and above `FLOOR_END_HZ`
const FLOOR_END_DB: f64 = -1.5;

/// Band used to remove the broadband offset of a reference match
const NORMALISE_LOW_HZ: f64 = 100.0;
const NORMALISE_HIGH_HZ: f64 = 10000.0;

/// Anchor of the translation curve: Gaussian bump in log2 frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveAnchor {
    pub freq_hz: f64,
    pub gain_db: f64,
    pub width_octaves: f64,
}

/// Translation curve used when no reference is supplied
pub const TRANSLATION_ANCHORS: [CurveAnchor; 4] = [
    // Sub tilt: gentle lift, no dip below it
    CurveAnchor { freq_hz: 45.0, gain_db: 0.6, width_octaves: 1.2 },
    // Low-mid mud
    CurveAnchor { freq_hz: 300.0, gain_db: -1.2, width_octaves: 0.8 },
    // Presence
    CurveAnchor { freq_hz: 3500.0, gain_db: 0.8, width_octaves: 0.9 },
    // Air
    CurveAnchor { freq_hz: 12000.0, gain_db: 1.0, width_octaves: 1.0 },
];

// ============================================================================
// Frequency Curve
// ============================================================================

/// Gain deltas (dB) over ascending frequency bins from 0 Hz to Nyquist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyCurve {
    freqs: Vec<f64>,
    gains_db: Vec<f64>,
}

impl FrequencyCurve {
    /// Build a curve, checking the bin layout
    ///
    /// # Errors
    /// `InvalidParameter` if the arrays differ in length, hold fewer than two
    /// points, do not start at 0 Hz or are not strictly increasing.
    pub fn new(freqs: Vec<f64>, gains_db: Vec<f64>) -> Result<Self> {
        let invalid = |expected: &str, value: String| MasterError::InvalidParameter {
            param: "frequency_curve".to_string(),
            value,
            expected: expected.to_string(),
        };

        if freqs.len() != gains_db.len() || freqs.len() < 2 {
            return Err(invalid(
                "at least two frequency/gain pairs of equal length",
                format!("{} freqs, {} gains", freqs.len(), gains_db.len()),
            ));
        }
        if freqs[0] != 0.0 {
            return Err(invalid("first bin at 0 Hz", format!("{}", freqs[0])));
        }
        if freqs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid("strictly increasing frequencies", "unsorted".to_string()));
        }
        if gains_db.iter().any(|g| !g.is_finite()) {
            return Err(invalid("finite gains", "NaN/Inf".to_string()));
        }

        Ok(Self { freqs, gains_db })
    }

    /// A 0 dB curve over the bins of an `n_fft` analysis at `sample_rate`
    pub fn flat(n_fft: usize, sample_rate: u32) -> Self {
        let freqs = bin_frequencies(n_fft, sample_rate);
        let gains_db = vec![0.0; freqs.len()];
        Self { freqs, gains_db }
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn gains_db(&self) -> &[f64] {
        &self.gains_db
    }

    /// Highest frequency covered (Nyquist of the analysis)
    pub fn nyquist(&self) -> f64 {
        self.freqs[self.freqs.len() - 1]
    }

    /// Gain at an arbitrary frequency by linear interpolation, held at the ends
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        let last = self.freqs.len() - 1;
        if freq_hz <= self.freqs[0] {
            return self.gains_db[0];
        }
        if freq_hz >= self.freqs[last] {
            return self.gains_db[last];
        }
        let idx = self.freqs.partition_point(|&f| f <= freq_hz);
        let (f0, f1) = (self.freqs[idx - 1], self.freqs[idx]);
        let (g0, g1) = (self.gains_db[idx - 1], self.gains_db[idx]);
        g0 + (g1 - g0) * (freq_hz - f0) / (f1 - f0)
    }

    /// Largest absolute adjustment in dB
    pub fn max_abs_db(&self) -> f64 {
        self.gains_db.iter().fold(0.0_f64, |m, g| m.max(g.abs()))
    }
}

// ============================================================================
// Curve Designer
// ============================================================================

/// Shaping controls for the target curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveShaping {
    /// Maximum boost/cut in dB
    pub max_db: f64,
    /// Moving-average width in Hz
    pub smoothing_hz: f64,
    /// Overall multiplier on the curve
    pub strength: f64,
    /// Extra multiplier for bins above 2 kHz
    pub hf_strength: f64,
}

/// Builds shaped target curves for one sample rate
#[derive(Debug, Clone)]
pub struct CurveDesigner {
    shaping: CurveShaping,
    n_fft: usize,
}

impl CurveDesigner {
    pub fn new(shaping: CurveShaping) -> Self {
        Self {
            shaping,
            n_fft: ANALYSIS_FFT_SIZE,
        }
    }

    /// Desired curve for `target`: reference-matched when a reference is
    /// given, the translation curve otherwise
    ///
    /// The reference must already be at the target's sample rate.
    pub fn design(&self, target: &AudioBuffer, reference: Option<&AudioBuffer>) -> Result<FrequencyCurve> {
        let freqs = bin_frequencies(self.n_fft, target.sample_rate);

        let raw = match reference {
            Some(reference) => self.reference_curve(target, reference, &freqs)?,
            None => translation_curve(&freqs),
        };

        Ok(FrequencyCurve {
            gains_db: self.shape(&freqs, raw, target.sample_rate),
            freqs,
        })
    }

    fn reference_curve(&self, target: &AudioBuffer, reference: &AudioBuffer, freqs: &[f64]) -> Result<Vec<f64>> {
        let target_mag = average_magnitude_spectrum(&mid_signal(target), self.n_fft)?;
        let reference_mag = average_magnitude_spectrum(&mid_signal(reference), self.n_fft)?;

        let mut diff: Vec<f64> = reference_mag
            .iter()
            .zip(&target_mag)
            .map(|(&r, &t)| 20.0 * ((r + MAGNITUDE_EPSILON) / (t + MAGNITUDE_EPSILON)).log10())
            .collect();

        // Loudness-neutral match: the governor owns overall level
        let (sum, count) = freqs
            .iter()
            .zip(&diff)
            .filter(|(f, _)| (NORMALISE_LOW_HZ..=NORMALISE_HIGH_HZ).contains(*f))
            .fold((0.0, 0usize), |(s, c), (_, &d)| (s + d, c + 1));
        if count > 0 {
            let offset = sum / count as f64;
            for d in diff.iter_mut() {
                *d -= offset;
            }
        }

        Ok(diff)
    }

    fn shape(&self, freqs: &[f64], raw: Vec<f64>, sample_rate: u32) -> Vec<f64> {
        let CurveShaping {
            max_db,
            smoothing_hz,
            strength,
            hf_strength,
        } = self.shaping;

        let bin_hz = sample_rate as f64 / self.n_fft as f64;
        let width = (smoothing_hz / bin_hz).round().max(1.0) as usize;
        let smoothed = moving_average(&raw, width);

        freqs
            .iter()
            .zip(smoothed)
            .map(|(&f, g)| {
                let mut g = g * strength;
                if f > HF_SPLIT_HZ {
                    g *= hf_strength;
                }
                g = g.max(cut_floor_db(f, max_db));
                g.clamp(-max_db, max_db)
            })
            .collect()
    }
}

/// Translation curve gains at the given frequencies
pub fn translation_curve(freqs: &[f64]) -> Vec<f64> {
    // 0 Hz takes the value of the lowest positive bin
    let lowest = freqs.iter().copied().find(|&f| f > 0.0).unwrap_or(1.0);
    freqs
        .iter()
        .map(|&f| {
            let f = if f > 0.0 { f } else { lowest };
            TRANSLATION_ANCHORS
                .iter()
                .map(|a| {
                    let octaves = (f / a.freq_hz).log2() / a.width_octaves;
                    a.gain_db * (-0.5 * octaves * octaves).exp()
                })
                .sum()
        })
        .collect()
}

/// Deepest cut allowed at `freq_hz`: the full range up to 8 kHz, relaxing
/// linearly to -1.5 dB at 16 kHz
pub fn cut_floor_db(freq_hz: f64, max_db: f64) -> f64 {
    let full = -max_db.abs();
    let relaxed = FLOOR_END_DB.max(full);
    if freq_hz <= FLOOR_START_HZ {
        full
    } else if freq_hz >= FLOOR_END_HZ {
        relaxed
    } else {
        let t = (freq_hz - FLOOR_START_HZ) / (FLOOR_END_HZ - FLOOR_START_HZ);
        full + (relaxed - full) * t
    }
}

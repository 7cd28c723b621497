//! Biquad filters
//!
//! RBJ cookbook sections for band splitting, the loudness weighting and the
//! parametric moves of the adaptive stages. Slices are filtered forward from
//! a zeroed state; arithmetic runs in f64.

use std::f64::consts::TAU;

/// Butterworth Q for a single 2nd-order section
pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Section Qs of a 4th-order Butterworth cascade
const BUTTERWORTH4_Q: [f64; 2] = [0.541_196_100_146_197, 1.306_562_964_876_376_6];

/// Normalised section, `a0 == 1`
///
/// `y[n] = b0 x[n] + b1 x[n-1] + b2 x[n-2] - a1 y[n-1] - a2 y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Shared cookbook intermediates for one corner frequency
struct Corner {
    cos: f64,
    alpha: f64,
}

impl Corner {
    fn new(sample_rate: f64, frequency: f64, q: f64) -> Self {
        // Corner strictly inside (0, Nyquist); 1 Hz wins at absurd rates
        let f = frequency.min(0.4995 * sample_rate).max(1.0);
        let w = TAU * f / sample_rate;
        Corner {
            cos: w.cos(),
            alpha: w.sin() / (2.0 * q.clamp(0.1, 10.0)),
        }
    }
}

impl BiquadCoeffs {
    /// Divide through by `a0`
    fn normalised(b: [f64; 3], a: [f64; 3]) -> Self {
        let inv = 1.0 / a[0];
        BiquadCoeffs {
            b0: b[0] * inv,
            b1: b[1] * inv,
            b2: b[2] * inv,
            a1: a[1] * inv,
            a2: a[2] * inv,
        }
    }

    /// Bell boost or cut around `frequency`
    pub fn peak(sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        let Corner { cos, alpha } = Corner::new(sample_rate, frequency, q);
        let amp = 10f64.powf(gain_db / 40.0);
        Self::normalised(
            [1.0 + alpha * amp, -2.0 * cos, 1.0 - alpha * amp],
            [1.0 + alpha / amp, -2.0 * cos, 1.0 - alpha / amp],
        )
    }

    /// Boost or cut everything above `frequency`
    pub fn high_shelf(sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        let Corner { cos, alpha } = Corner::new(sample_rate, frequency, q);
        let amp = 10f64.powf(gain_db / 40.0);
        let (p, m) = (amp + 1.0, amp - 1.0);
        let k = 2.0 * amp.sqrt() * alpha;
        Self::normalised(
            [
                amp * (p + m * cos + k),
                -2.0 * amp * (m + p * cos),
                amp * (p + m * cos - k),
            ],
            [p - m * cos + k, 2.0 * (m - p * cos), p - m * cos - k],
        )
    }

    pub fn high_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        let Corner { cos, alpha } = Corner::new(sample_rate, frequency, q);
        let edge = (1.0 + cos) / 2.0;
        Self::normalised(
            [edge, -2.0 * edge, edge],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    pub fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        let Corner { cos, alpha } = Corner::new(sample_rate, frequency, q);
        let edge = (1.0 - cos) / 2.0;
        Self::normalised(
            [edge, 2.0 * edge, edge],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }
}

/// Per-channel memory of one section (transposed direct form II)
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    s1: f64,
    s2: f64,
}

impl BiquadState {
    #[inline]
    pub fn process(&mut self, x: f64, c: &BiquadCoeffs) -> f64 {
        let y = c.b0 * x + self.s1;
        self.s1 = c.b1 * x - c.a1 * y + self.s2;
        self.s2 = c.b2 * x - c.a2 * y;
        y
    }
}

/// Filtered copy of `samples` through `sections` in order
pub fn filter_cascade(samples: &[f32], sections: &[BiquadCoeffs]) -> Vec<f32> {
    let mut chain: Vec<(BiquadState, &BiquadCoeffs)> =
        sections.iter().map(|c| (BiquadState::default(), c)).collect();
    samples
        .iter()
        .map(|&x| {
            chain
                .iter_mut()
                .fold(f64::from(x), |acc, (state, c)| state.process(acc, c)) as f32
        })
        .collect()
}

/// 2nd-order Butterworth high-pass
pub fn high_pass(samples: &[f32], sample_rate: u32, frequency: f64) -> Vec<f32> {
    filter_cascade(
        samples,
        &[BiquadCoeffs::high_pass(f64::from(sample_rate), frequency, BUTTERWORTH_Q)],
    )
}

/// 2nd-order Butterworth low-pass
pub fn low_pass(samples: &[f32], sample_rate: u32, frequency: f64) -> Vec<f32> {
    filter_cascade(
        samples,
        &[BiquadCoeffs::low_pass(f64::from(sample_rate), frequency, BUTTERWORTH_Q)],
    )
}

/// 4th-order Butterworth high-pass
pub fn high_pass4(samples: &[f32], sample_rate: u32, frequency: f64) -> Vec<f32> {
    let rate = f64::from(sample_rate);
    filter_cascade(samples, &BUTTERWORTH4_Q.map(|q| BiquadCoeffs::high_pass(rate, frequency, q)))
}

/// 4th-order Butterworth low-pass
pub fn low_pass4(samples: &[f32], sample_rate: u32, frequency: f64) -> Vec<f32> {
    let rate = f64::from(sample_rate);
    filter_cascade(samples, &BUTTERWORTH4_Q.map(|q| BiquadCoeffs::low_pass(rate, frequency, q)))
}

/// Upper band edge kept safely below Nyquist at any sample rate
#[inline]
pub fn band_top(high_hz: f64, sample_rate: u32) -> f64 {
    high_hz.min(0.45 * f64::from(sample_rate))
}

/// High-pass at `low_hz` then low-pass at `high_hz`
pub fn band_pass(samples: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> Vec<f32> {
    let rate = f64::from(sample_rate);
    filter_cascade(
        samples,
        &[
            BiquadCoeffs::high_pass(rate, low_hz, BUTTERWORTH_Q),
            BiquadCoeffs::low_pass(rate, high_hz, BUTTERWORTH_Q),
        ],
    )
}

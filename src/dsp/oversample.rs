//! Polyphase oversampling
//!
//! Windowed-sinc interpolation and decimation for offline buffers. The
//! prototype filter has an odd length with its centre on an input sample,
//! so the oversampled signal is time-aligned with the input
//! (`up[k * factor] == x[k]`).

use std::f64::consts::PI;

/// Default oversampling factor for inter-sample peak work
pub const DEFAULT_FACTOR: usize = 4;

/// Default taps per polyphase branch
pub const DEFAULT_TAPS_PER_PHASE: usize = 8;

/// Windowed-sinc interpolator/decimator pair
#[derive(Debug, Clone)]
pub struct Oversampler {
    factor: usize,
    /// Prototype low-pass at the original Nyquist, unity gain per phase
    coeffs: Vec<f64>,
}

impl Default for Oversampler {
    fn default() -> Self {
        Self::new(DEFAULT_FACTOR, DEFAULT_TAPS_PER_PHASE)
    }
}

impl Oversampler {
    /// Create an oversampler; `factor` and `taps_per_phase` are raised to at least 1
    pub fn new(factor: usize, taps_per_phase: usize) -> Self {
        let factor = factor.max(1);
        let taps = factor * taps_per_phase.max(1) + 1;
        let centre = (taps - 1) as f64 / 2.0;

        let coeffs = (0..taps)
            .map(|i| {
                let n = i as f64 - centre;
                let sinc = if n.abs() < 1e-9 {
                    1.0
                } else {
                    let x = PI * n / factor as f64;
                    x.sin() / x
                };

                // Blackman window
                let phase = 2.0 * PI * i as f64 / (taps - 1) as f64;
                let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();

                sinc * window
            })
            .collect();

        Self { factor, coeffs }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    fn delay(&self) -> usize {
        (self.coeffs.len() - 1) / 2
    }

    /// Upsample by zero-stuffing and interpolation; output length is `len * factor`
    pub fn upsample(&self, input: &[f32]) -> Vec<f64> {
        let factor = self.factor;
        let taps = self.coeffs.len();
        let delay = self.delay();
        let len = input.len();
        let mut output = vec![0.0; len * factor];

        for (m, out) in output.iter_mut().enumerate() {
            let pos = m + delay;
            // Newest input sample that lines up with a tap
            let mut k = pos / factor;
            let mut i = pos - k * factor;
            let mut acc = 0.0;
            while i < taps {
                if k < len {
                    acc += self.coeffs[i] * input[k] as f64;
                }
                if k == 0 {
                    break;
                }
                k -= 1;
                i += factor;
            }
            *out = acc;
        }

        output
    }

    /// Low-pass and decimate an oversampled signal back to the base rate
    pub fn downsample(&self, input: &[f64]) -> Vec<f64> {
        let factor = self.factor;
        let delay = self.delay() as isize;
        let len = input.len();
        let out_len = len / factor;
        let norm = 1.0 / factor as f64;

        (0..out_len)
            .map(|k| {
                let centre = (k * factor) as isize + delay;
                self.coeffs
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &c)| {
                        let idx = centre - i as isize;
                        if idx >= 0 && (idx as usize) < len {
                            Some(c * input[idx as usize])
                        } else {
                            None
                        }
                    })
                    .sum::<f64>()
                    * norm
            })
            .collect()
    }
}

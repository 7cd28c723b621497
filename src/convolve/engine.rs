//! Block FIR convolution
//!
//! Long inputs go through overlap-save with a bounded transform size; short
//! ones take a direct time-domain path. Both produce the same samples of the
//! full linear convolution, cropped according to [`Alignment`].

use std::sync::Arc;

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::convolve::cache::{SpectrumCache, SpectrumKey};
use crate::dsp::spectrum::{fft_error, forward_padded, next_pow2};
use crate::engine::AudioBuffer;
use crate::eq::FirFilter;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Amount of new input consumed per block
pub const BLOCK_TARGET_MS: f64 = 256.0;

/// Largest transform used unless the filter itself needs more
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// `input_len * taps` at or below which the direct path is used
pub const DIRECT_PATH_LIMIT: usize = 1 << 20;

// ============================================================================
// Alignment
// ============================================================================

/// Which window of the full convolution is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Shifted left by the filter delay: zero-phase equivalent
    #[default]
    Same,
    /// Unshifted: output sample k depends only on inputs at or before k
    Causal,
}

impl Alignment {
    fn offset(self, filter: &FirFilter) -> usize {
        match self {
            Alignment::Same => filter.delay(),
            Alignment::Causal => 0,
        }
    }
}

/// Transform size for a filter at a given sample rate
///
/// A power of two sized from [`BLOCK_TARGET_MS`], capped at
/// [`MAX_FFT_SIZE`], and never smaller than twice the filter length.
pub fn fft_size_for(taps: usize, sample_rate: u32) -> usize {
    let block = (BLOCK_TARGET_MS * sample_rate as f64 / 1000.0).round() as usize;
    let sized = next_pow2(block + taps.saturating_sub(1)).min(MAX_FFT_SIZE);
    sized.max(next_pow2(2 * taps))
}

// ============================================================================
// Engine
// ============================================================================

/// Applies FIR filters to stereo buffers, sharing filter spectra through a cache
#[derive(Debug, Clone)]
pub struct ConvolutionEngine {
    cache: Arc<SpectrumCache>,
    direct_limit: usize,
}

impl ConvolutionEngine {
    pub fn new(cache: Arc<SpectrumCache>) -> Self {
        Self {
            cache,
            direct_limit: DIRECT_PATH_LIMIT,
        }
    }

    /// Override the direct-path threshold (0 forces overlap-save)
    pub fn with_direct_limit(mut self, limit: usize) -> Self {
        self.direct_limit = limit;
        self
    }

    pub fn cache(&self) -> &Arc<SpectrumCache> {
        &self.cache
    }

    /// Filter both channels; the output has exactly the input's length
    ///
    /// # Errors
    /// `CacheCorrupted` if the shared spectrum cache returns a malformed
    /// entry, `ProcessingError` if a transform fails.
    pub fn apply(&self, buffer: &AudioBuffer, filter: &FirFilter, alignment: Alignment) -> Result<AudioBuffer> {
        if buffer.is_empty() {
            return Ok(buffer.clone());
        }

        let mut output = buffer.clone();
        for ch in 0..buffer.channels() {
            let filtered = self.convolve(buffer.channel(ch), filter, alignment, buffer.sample_rate)?;
            for (dst, v) in output.channel_mut(ch).iter_mut().zip(filtered) {
                *dst = v as f32;
            }
        }
        Ok(output)
    }

    /// Filter one channel, returning f64 samples of the input's length
    pub fn convolve(
        &self,
        samples: &[f32],
        filter: &FirFilter,
        alignment: Alignment,
        sample_rate: u32,
    ) -> Result<Vec<f64>> {
        let offset = alignment.offset(filter);
        if samples.len().saturating_mul(filter.len()) <= self.direct_limit {
            tracing::trace!(len = samples.len(), taps = filter.len(), "direct convolution");
            return Ok(convolve_direct(samples, filter.taps(), offset));
        }

        let fft_size = fft_size_for(filter.len(), sample_rate);
        tracing::trace!(
            len = samples.len(),
            taps = filter.len(),
            fft_size,
            "overlap-save convolution"
        );
        self.overlap_save(samples, filter, offset, fft_size)
    }

    /// Overlap-save over blocks of `fft_size - (taps - 1)` new samples
    ///
    /// Produces full-convolution samples `[offset, offset + len)`. The input
    /// is read as if followed by `taps - 1` zeros so the tail is flushed.
    fn overlap_save(&self, samples: &[f32], filter: &FirFilter, offset: usize, fft_size: usize) -> Result<Vec<f64>> {
        let taps = filter.len();
        let history = taps - 1;
        let hop = fft_size - history;
        let len = samples.len();
        let end = offset + len;

        let key = SpectrumKey {
            taps,
            fft_size,
            fingerprint: filter.fingerprint().to_string(),
        };
        let (response, _) = self
            .cache
            .get_or_try_insert(&key, || forward_padded(filter.taps(), fft_size))?;

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);
        let mut frame = r2c.make_input_vec();
        let mut spectrum = r2c.make_output_vec();
        let mut block_out = c2r.make_output_vec();
        let mut overlap = vec![0.0; history];
        let mut output = vec![0.0; len];
        let norm = 1.0 / fft_size as f64;

        let mut pos = 0;
        while pos < end {
            frame[..history].copy_from_slice(&overlap);
            for (i, slot) in frame[history..].iter_mut().enumerate() {
                *slot = samples.get(pos + i).map_or(0.0, |&s| s as f64);
            }
            overlap.copy_from_slice(&frame[hop..]);

            r2c.process(&mut frame, &mut spectrum).map_err(fft_error)?;
            for (bin, h) in spectrum.iter_mut().zip(response.iter()) {
                *bin = *bin * *h;
            }
            // DC and Nyquist must stay purely real for the inverse transform
            if let Some(first) = spectrum.first_mut() {
                first.im = 0.0;
            }
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }
            c2r.process(&mut spectrum, &mut block_out).map_err(fft_error)?;

            for (j, &v) in block_out[history..].iter().enumerate() {
                let k = pos + j;
                if k >= offset && k < end {
                    output[k - offset] = v * norm;
                }
            }
            pos += hop;
        }

        Ok(output)
    }
}

/// Full-convolution samples `[offset, offset + len)` computed term by term
pub fn convolve_direct(samples: &[f32], taps: &[f64], offset: usize) -> Vec<f64> {
    let len = samples.len();
    if len == 0 || taps.is_empty() {
        return vec![0.0; len];
    }

    (offset..offset + len)
        .map(|k| {
            let lo = k.saturating_sub(len - 1);
            let hi = k.min(taps.len() - 1);
            (lo..=hi).map(|t| taps[t] * samples[k - t] as f64).sum()
        })
        .collect()
}

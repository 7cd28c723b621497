//! Audio Buffer Management
//!
//! Every buffer inside the engine is planar two-channel `f32`. Mono sources
//! are spread to both sides when they enter, so stages never branch on the
//! channel count.

use crate::error::{MasterError, Result};

/// Default processing sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Lowest sample rate the engine will process; its fixed band edges
/// (sub, presence, air) need at least this much bandwidth
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Number of channels carried by every internal buffer
pub const INTERNAL_CHANNELS: usize = 2;

/// Largest positive value representable by 16-bit PCM
pub const PCM16_MAX: f32 = 1.0 - 1.0 / 32768.0;

/// Planar stereo audio at a fixed sample rate
///
/// Values may leave [-1, 1] between stages. [`AudioBuffer::clamp`] runs once,
/// before the buffer leaves the engine.
///
/// ```
/// use auralmind::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
///
/// let half_second = AudioBuffer::new(24000, DEFAULT_SAMPLE_RATE);
/// assert_eq!(half_second.channels(), 2);
/// assert_eq!(half_second.seconds(), 0.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// `samples[0]` is left, `samples[1]` is right; both have equal length
    pub samples: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Silent buffer of `frames` samples per side
    pub fn new(frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0; frames]; INTERNAL_CHANNELS],
            sample_rate,
        }
    }

    pub fn from_stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(MasterError::InvalidAudio {
                reason: format!(
                    "left channel has {} frames but right has {}",
                    left.len(),
                    right.len()
                ),
                source: None,
            });
        }
        Ok(Self {
            samples: vec![left, right],
            sample_rate,
        })
    }

    /// Spread a mono signal to both sides
    pub fn from_mono(mono: Vec<f32>, sample_rate: u32) -> Self {
        let copy = mono.clone();
        Self {
            samples: vec![mono, copy],
            sample_rate,
        }
    }

    /// Accepts one channel (duplicated) or two
    ///
    /// # Errors
    /// * `UnsupportedFormat` - zero or more than two channels
    /// * `InvalidAudio` - stereo channels of different length
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let count = channels.len();
        let mut planes = channels.into_iter();
        match (planes.next(), planes.next(), count) {
            (Some(mono), None, 1) => Ok(Self::from_mono(mono, sample_rate)),
            (Some(left), Some(right), 2) => Self::from_stereo(left, right, sample_rate),
            _ => Err(MasterError::UnsupportedFormat {
                format: format!("{}-channel audio (mono and stereo only)", count),
            }),
        }
    }

    /// Split frame-ordered samples into planes
    ///
    /// `channel_count` must be 1 or 2 and must divide `frames.len()`.
    pub fn deinterleave(frames: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if !(1..=INTERNAL_CHANNELS).contains(&channel_count) {
            return Err(MasterError::UnsupportedFormat {
                format: format!("{}-channel audio (mono and stereo only)", channel_count),
            });
        }
        if frames.len() % channel_count != 0 {
            return Err(MasterError::InvalidAudio {
                reason: format!(
                    "{} samples do not split into whole {}-channel frames",
                    frames.len(),
                    channel_count
                ),
                source: None,
            });
        }

        let planes = (0..channel_count)
            .map(|offset| frames.iter().skip(offset).step_by(channel_count).copied().collect())
            .collect();
        Self::from_channels(planes, sample_rate)
    }

    /// Frame-ordered samples: L0, R0, L1, R1, ...
    pub fn interleave(&self) -> Vec<f32> {
        self.left()
            .iter()
            .zip(self.right())
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn seconds(&self) -> f64 {
        match self.sample_rate {
            0 => 0.0,
            rate => self.len() as f64 / f64::from(rate),
        }
    }

    #[inline]
    pub fn left(&self) -> &[f32] {
        &self.samples[0]
    }

    #[inline]
    pub fn right(&self) -> &[f32] {
        &self.samples[1]
    }

    /// # Panics
    /// On an index other than 0 or 1
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// # Panics
    /// On an index other than 0 or 1
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    fn iter_all(&self) -> impl Iterator<Item = &f32> {
        self.samples.iter().flatten()
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut f32)) {
        self.samples.iter_mut().flatten().for_each(|s| f(s));
    }

    /// No NaN or infinity anywhere
    pub fn is_finite(&self) -> bool {
        self.iter_all().all(|s| s.is_finite())
    }

    pub fn is_silent(&self) -> bool {
        self.iter_all().all(|&s| s == 0.0)
    }

    /// Hard-limit every sample to [-1, 1]
    pub fn clamp(&mut self) {
        self.for_each_mut(|s| *s = s.clamp(-1.0, 1.0));
    }

    /// Scale by a linear factor
    pub fn apply_gain(&mut self, gain: f32) {
        self.for_each_mut(|s| *s *= gain);
    }

    /// Copy at another sample rate
    ///
    /// Linear interpolation; good enough for analysis material such as a
    /// reference track, not for programme audio.
    pub fn resampled(&self, target_rate: u32) -> AudioBuffer {
        let samples = if target_rate == self.sample_rate || self.sample_rate == 0 {
            self.samples.clone()
        } else {
            let step = f64::from(self.sample_rate) / f64::from(target_rate);
            self.samples.iter().map(|plane| interpolate(plane, step)).collect()
        };
        AudioBuffer {
            samples,
            sample_rate: target_rate,
        }
    }
}

/// Read `plane` at positions 0, step, 2*step, ...
fn interpolate(plane: &[f32], step: f64) -> Vec<f32> {
    let Some(&last) = plane.last() else {
        return Vec::new();
    };
    let out_len = ((plane.len() as f64) / step).round().max(1.0) as usize;

    (0..out_len)
        .map(|n| {
            let pos = n as f64 * step;
            let base = pos as usize;
            match (plane.get(base), plane.get(base + 1)) {
                (Some(&a), Some(&b)) => {
                    let t = (pos - base as f64) as f32;
                    a + (b - a) * t
                }
                (Some(&a), None) => a,
                _ => last,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_stereo_and_silent() {
        let buffer = AudioBuffer::new(1000, DEFAULT_SAMPLE_RATE);
        assert_eq!(buffer.channels(), INTERNAL_CHANNELS);
        assert_eq!(buffer.len(), 1000);
        assert!(buffer.is_silent());
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_mono_is_duplicated() {
        let buffer = AudioBuffer::from_mono(vec![0.1, -0.2, 0.3], 44100);
        assert_eq!(buffer.left(), buffer.right());
        assert_eq!(buffer.sample_rate, 44100);
    }

    #[test]
    fn test_from_channels_rejects_surround() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 4]; 6], 48000);
        match result {
            Err(MasterError::UnsupportedFormat { format }) => assert!(format.starts_with("6-channel")),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_from_stereo_rejects_length_mismatch() {
        let result = AudioBuffer::from_stereo(vec![0.0; 4], vec![0.0; 5], 48000);
        assert!(matches!(result, Err(MasterError::InvalidAudio { .. })));
    }

    #[test]
    fn test_deinterleave_splits_frames() {
        let frames = vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0];
        let buffer = AudioBuffer::deinterleave(&frames, 2, 48000).unwrap();
        assert_eq!(buffer.left(), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.right(), &[5.0, 6.0, 7.0]);
        assert_eq!(buffer.interleave(), frames);
    }

    #[test]
    fn test_deinterleave_mono_duplicates() {
        let buffer = AudioBuffer::deinterleave(&[0.5, 0.25], 1, 48000).unwrap();
        assert_eq!(buffer.right(), &[0.5, 0.25]);
    }

    #[test]
    fn test_deinterleave_rejects_partial_frame() {
        assert!(AudioBuffer::deinterleave(&[0.0, 0.1, 0.2], 2, 48000).is_err());
        assert!(AudioBuffer::deinterleave(&[0.0; 6], 3, 48000).is_err());
    }

    #[test]
    fn test_clamp_then_gain() {
        let mut buffer = AudioBuffer::from_stereo(vec![2.0, -0.5], vec![-3.0, 0.25], 48000).unwrap();
        buffer.clamp();
        assert_eq!(buffer.right(), &[-1.0, 0.25]);
        buffer.apply_gain(0.5);
        assert_eq!(buffer.left(), &[0.5, -0.25]);
    }

    #[test]
    fn test_is_finite_detects_nan() {
        let mut buffer = AudioBuffer::new(4, 48000);
        assert!(buffer.is_finite());
        buffer.channel_mut(1)[2] = f32::NAN;
        assert!(!buffer.is_finite());
    }

    #[test]
    fn test_upsampling_interpolates_midpoints() {
        let buffer = AudioBuffer::from_mono(vec![0.0, 1.0, 0.0], 24000);
        let up = buffer.resampled(48000);
        assert_eq!(up.sample_rate, 48000);
        assert_eq!(up.len(), 6);
        assert!((up.left()[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_same_rate_is_identity() {
        let buffer = AudioBuffer::from_mono(vec![0.1, 0.2], 48000);
        assert_eq!(buffer.resampled(48000), buffer);
    }

    #[test]
    fn test_44k_to_48k_length() {
        let up = AudioBuffer::new(44100, 44100).resampled(48000);
        assert_eq!(up.len(), 48000);
    }
}

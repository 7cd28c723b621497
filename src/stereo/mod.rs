//! Stereo Field Processing
//!
//! Mid/side stages that shape the stereo image:
//! - Mono-sub: adaptive monoization of sub-bass side energy
//! - Spatial widening: band-dependent side gain under a correlation guard
//! - Micro-shift: fractional delay of the high side band
//! - Micro-detail: upward compression of the high side band
//!
//! Every stage works on the side channel only and maps zero side to zero
//! side, so mono material passes through unchanged.

pub mod micro_detail;
pub mod micro_shift;
pub mod mono_sub;
pub mod widen;

pub use micro_detail::{MicroDetail, MicroDetailParams};
pub use micro_shift::{MicroShift, MicroShiftParams};
pub use mono_sub::{MonoSub, MonoSubParams};
pub use widen::{SpatialWiden, WidenParams};

use crate::dsp::biquad::high_pass;
use crate::engine::AudioBuffer;

// ============================================================================
// Mid/Side
// ============================================================================

/// Mid/side representation of a stereo buffer
///
/// `mid = (L + R) / 2`, `side = (L - R) / 2`; decoding is the exact inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct MidSide {
    pub mid: Vec<f32>,
    pub side: Vec<f32>,
    pub sample_rate: u32,
}

impl MidSide {
    pub fn encode(buffer: &AudioBuffer) -> Self {
        let (mid, side) = buffer
            .left()
            .iter()
            .zip(buffer.right())
            .map(|(&l, &r)| {
                let (l, r) = (l as f64, r as f64);
                ((0.5 * (l + r)) as f32, (0.5 * (l - r)) as f32)
            })
            .unzip();
        Self {
            mid,
            side,
            sample_rate: buffer.sample_rate,
        }
    }

    pub fn decode(&self) -> AudioBuffer {
        let (left, right) = self
            .mid
            .iter()
            .zip(&self.side)
            .map(|(&m, &s)| {
                let (m, s) = (m as f64, s as f64);
                ((m + s) as f32, (m - s) as f32)
            })
            .unzip();
        AudioBuffer {
            samples: vec![left, right],
            sample_rate: self.sample_rate,
        }
    }

    /// Mean-square energy of the side channel
    pub fn side_energy(&self) -> f64 {
        crate::measure::mean_square(&self.side)
    }
}

// ============================================================================
// Band splitting
// ============================================================================

/// Three complementary bands of a signal: low + mid + high == input
#[derive(Debug, Clone)]
pub struct Bands {
    pub low: Vec<f32>,
    pub mid: Vec<f32>,
    pub high: Vec<f32>,
}

/// Split at two corners with successive 2nd-order high-passes
pub fn split_three(samples: &[f32], sample_rate: u32, low_split_hz: f64, high_split_hz: f64) -> Bands {
    let above_low = high_pass(samples, sample_rate, low_split_hz);
    let high = high_pass(samples, sample_rate, high_split_hz);
    let low = samples.iter().zip(&above_low).map(|(&x, &h)| x - h).collect();
    let mid = above_low.iter().zip(&high).map(|(&a, &h)| a - h).collect();
    Bands { low, mid, high }
}

/// Split at one corner: returns (below, above) with below + above == input
pub fn split_two(samples: &[f32], sample_rate: u32, split_hz: f64) -> (Vec<f32>, Vec<f32>) {
    let high = high_pass(samples, sample_rate, split_hz);
    let low = samples.iter().zip(&high).map(|(&x, &h)| x - h).collect();
    (low, high)
}

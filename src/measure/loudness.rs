//! Approximate integrated loudness
//!
//! K-weighting is approximated with an RBJ high-pass and high shelf rather
//! than the exact BS.1770 pre-filter coefficients. The calibration offset
//! and gating follow BS.1770: 400 ms blocks at a 100 ms hop, an absolute gate
//! at -70 LUFS and a relative gate 10 dB below the absolute-gated mean.
//! Preset loudness targets are tuned against this meter.

use crate::dsp::biquad::{filter_cascade, BiquadCoeffs};
use crate::engine::AudioBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Returned when no block survives gating
pub const LOUDNESS_FLOOR_LUFS: f64 = -100.0;

/// BS.1770 calibration offset
const LUFS_OFFSET: f64 = -0.691;

const BLOCK_MS: f64 = 400.0;
const HOP_MS: f64 = 100.0;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_DB: f64 = -10.0;

const WEIGHTING_HP_HZ: f64 = 60.0;
const WEIGHTING_HP_Q: f64 = 0.5;
const WEIGHTING_SHELF_HZ: f64 = 1500.0;
const WEIGHTING_SHELF_DB: f64 = 4.0;
const WEIGHTING_SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

// ============================================================================
// Weighting
// ============================================================================

fn weighting_sections(sample_rate: u32) -> [BiquadCoeffs; 2] {
    let rate = sample_rate as f64;
    [
        BiquadCoeffs::high_pass(rate, WEIGHTING_HP_HZ, WEIGHTING_HP_Q),
        BiquadCoeffs::high_shelf(rate, WEIGHTING_SHELF_HZ, WEIGHTING_SHELF_DB, WEIGHTING_SHELF_Q),
    ]
}

#[inline]
fn power_to_lufs(power: f64) -> f64 {
    if power <= 0.0 {
        return LOUDNESS_FLOOR_LUFS;
    }
    (LUFS_OFFSET + 10.0 * power.log10()).max(LOUDNESS_FLOOR_LUFS)
}

#[inline]
fn lufs_to_power(lufs: f64) -> f64 {
    10.0_f64.powf((lufs - LUFS_OFFSET) / 10.0)
}

/// Per-block weighted power (sum over channels of the block mean square)
fn block_powers(buffer: &AudioBuffer) -> Vec<f64> {
    let len = buffer.len();
    let rate = buffer.sample_rate.max(1) as f64;
    let sections = weighting_sections(buffer.sample_rate.max(1));

    let weighted: Vec<Vec<f64>> = buffer
        .samples
        .iter()
        .map(|channel| {
            filter_cascade(channel, &sections)
                .into_iter()
                .map(|s| (s as f64) * (s as f64))
                .collect()
        })
        .collect();

    let block = ((BLOCK_MS / 1000.0) * rate).round() as usize;
    let hop = ((HOP_MS / 1000.0) * rate).round().max(1.0) as usize;

    // Shorter than one block: measure the whole buffer as a single block
    let (block, starts): (usize, Vec<usize>) = if len < block || block == 0 {
        (len, vec![0])
    } else {
        (block, (0..=len - block).step_by(hop).collect())
    };

    if block == 0 {
        return Vec::new();
    }

    starts
        .into_iter()
        .map(|start| {
            weighted
                .iter()
                .map(|squares| squares[start..start + block].iter().sum::<f64>() / block as f64)
                .sum()
        })
        .collect()
}

/// Gated, K-weighted integrated loudness in LUFS
///
/// Returns [`LOUDNESS_FLOOR_LUFS`] for empty or silent buffers, or whenever
/// no block passes the gates.
pub fn integrated_loudness(buffer: &AudioBuffer) -> f64 {
    let powers = block_powers(buffer);

    let absolute_gate = lufs_to_power(ABSOLUTE_GATE_LUFS);
    let gated: Vec<f64> = powers.into_iter().filter(|&p| p > absolute_gate).collect();
    if gated.is_empty() {
        return LOUDNESS_FLOOR_LUFS;
    }

    let mean = gated.iter().sum::<f64>() / gated.len() as f64;
    let relative_gate = lufs_to_power(power_to_lufs(mean) + RELATIVE_GATE_DB);

    let (sum, count) = gated
        .iter()
        .filter(|&&p| p >= relative_gate)
        .fold((0.0, 0usize), |(s, c), &p| (s + p, c + 1));

    if count == 0 {
        return LOUDNESS_FLOOR_LUFS;
    }

    power_to_lufs(sum / count as f64)
}

//! Lookahead true-peak limiter
//!
//! Stereo-linked gain computer over a forward moving maximum, smoothed with
//! separate attack and release, followed by one corrective scale if the
//! oversampled peak still lands above the ceiling.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{moving_max_forward, time_to_coeff};
use crate::engine::AudioBuffer;
use crate::measure::{db_to_linear, linear_to_db, true_peak};

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterParams {
    pub lookahead_ms: f64,
    /// Time towards more reduction
    pub attack_ms: f64,
    /// Time towards less reduction
    pub release_ms: f64,
    /// Weight of the per-channel peak against the mid proxy (0..1)
    pub link: f64,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            lookahead_ms: 1.5,
            attack_ms: 0.5,
            release_ms: 60.0,
            link: 0.8,
        }
    }
}

/// Limiter diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimiterReport {
    /// Deepest gain applied, including the corrective pass (dB, <= 0)
    pub min_gain_db: f64,
    /// Oversampled peak of the output (dBTP)
    pub true_peak_db: f64,
    /// Gain of the corrective pass (dB, 0 when not needed)
    pub correction_db: f64,
}

// ============================================================================
// Limiter
// ============================================================================

#[derive(Debug, Clone)]
pub struct TruePeakLimiter {
    params: LimiterParams,
    ceiling_db: f64,
}

impl TruePeakLimiter {
    pub fn new(params: LimiterParams, ceiling_db: f64) -> Self {
        Self { params, ceiling_db }
    }

    pub fn ceiling_db(&self) -> f64 {
        self.ceiling_db
    }

    /// Linked detector: `link * max(|L|, |R|) + (1 - link) * |mid|`
    fn detector(&self, buffer: &AudioBuffer) -> Vec<f64> {
        let link = self.params.link.clamp(0.0, 1.0);
        buffer
            .left()
            .iter()
            .zip(buffer.right())
            .map(|(&l, &r)| {
                let (l, r) = (l as f64, r as f64);
                link * l.abs().max(r.abs()) + (1.0 - link) * (0.5 * (l + r)).abs()
            })
            .collect()
    }

    /// Smoothed gain curve that keeps the detector at or below the ceiling
    pub fn gain_curve(&self, buffer: &AudioBuffer) -> Vec<f64> {
        let rate = buffer.sample_rate;
        let ceiling = db_to_linear(self.ceiling_db);
        let window = (self.params.lookahead_ms * rate as f64 / 1000.0).round() as usize;
        let peaks = moving_max_forward(&self.detector(buffer), window);

        let attack = time_to_coeff(self.params.attack_ms, rate);
        let release = time_to_coeff(self.params.release_ms, rate);
        let mut gain = 1.0_f64;

        peaks
            .iter()
            .map(|&peak| {
                let target = if peak > ceiling { ceiling / peak } else { 1.0 };
                let coeff = if target < gain { attack } else { release };
                gain = coeff * gain + (1.0 - coeff) * target;
                gain = gain.min(target);
                gain
            })
            .collect()
    }

    pub fn process(&self, buffer: &AudioBuffer) -> (AudioBuffer, LimiterReport) {
        let ceiling = db_to_linear(self.ceiling_db);
        if buffer.is_empty() {
            let report = LimiterReport {
                min_gain_db: 0.0,
                true_peak_db: linear_to_db(0.0),
                correction_db: 0.0,
            };
            return (buffer.clone(), report);
        }

        let gains = self.gain_curve(buffer);
        let min_gain = gains.iter().copied().fold(1.0_f64, f64::min);

        let mut output = buffer.clone();
        for ch in 0..output.channels() {
            for (s, &g) in output.channel_mut(ch).iter_mut().zip(&gains) {
                *s = (*s as f64 * g) as f32;
            }
        }

        // Single inter-sample correction
        let mut peak = true_peak(&output);
        let mut correction = 1.0;
        if peak > ceiling {
            correction = ceiling / peak;
            output.apply_gain(correction as f32);
            peak = true_peak(&output);
        }

        let report = LimiterReport {
            min_gain_db: linear_to_db(min_gain * correction),
            true_peak_db: linear_to_db(peak),
            correction_db: linear_to_db(correction),
        };
        tracing::trace!(
            min_gain_db = report.min_gain_db,
            true_peak_db = report.true_peak_db,
            correction_db = report.correction_db,
            "limiter"
        );
        (output, report)
    }
}

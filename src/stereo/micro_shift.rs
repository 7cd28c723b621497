//! Correlation-guarded micro-shift
//!
//! Adds a fractionally delayed copy of the high side band back onto itself,
//! then restores the band's original RMS so the image opens up without a
//! level jump.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::band_top;
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{band_correlation, correlation_guard, rms, ENERGY_EPSILON};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::{split_two, MidSide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroShiftParams {
    /// Side content above this frequency is shifted
    pub split_hz: f64,
    pub delay_ms: f64,
    /// Level of the delayed copy at full guard
    pub wet: f64,
    pub guard_low: f64,
    pub guard_high: f64,
    /// Upper edge of the band measured for the guard
    pub correlation_high_hz: f64,
}

impl Default for MicroShiftParams {
    fn default() -> Self {
        Self {
            split_hz: 2500.0,
            delay_ms: 0.35,
            wet: 0.25,
            guard_low: 0.2,
            guard_high: 0.6,
            correlation_high_hz: 16000.0,
        }
    }
}

/// Delay a signal by a fractional number of samples (linear interpolation)
///
/// Samples before the start read as zero; the output keeps the input length.
pub fn fractional_delay(samples: &[f32], delay_samples: f64) -> Vec<f32> {
    let delay = delay_samples.max(0.0);
    let whole = delay.floor() as usize;
    let frac = (delay - whole as f64) as f32;
    let at = |i: Option<usize>| i.and_then(|i| samples.get(i)).copied().unwrap_or(0.0);

    (0..samples.len())
        .map(|n| {
            let a = at(n.checked_sub(whole));
            let b = at(n.checked_sub(whole + 1));
            (1.0 - frac) * a + frac * b
        })
        .collect()
}

/// Mix a delayed copy into `band` and rescale to the band's original RMS
///
/// Returns the shifted band and the renormalisation gain applied.
pub fn shift_band(band: &[f32], delay_samples: f64, wet: f64) -> (Vec<f32>, f64) {
    let before = rms(band);
    let delayed = fractional_delay(band, delay_samples);
    let mut shifted: Vec<f32> = band
        .iter()
        .zip(&delayed)
        .map(|(&h, &d)| h + wet as f32 * d)
        .collect();

    let after = rms(&shifted);
    let renorm = if after > 0.0 { before / after } else { 1.0 };
    for v in &mut shifted {
        *v *= renorm as f32;
    }
    (shifted, renorm)
}

#[derive(Debug, Clone, Default)]
pub struct MicroShift {
    pub params: MicroShiftParams,
}

impl MicroShift {
    pub fn new(params: MicroShiftParams) -> Self {
        Self { params }
    }
}

impl Stage for MicroShift {
    fn name(&self) -> &'static str {
        "micro_shift"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let correlation = band_correlation(
            buffer.left(),
            buffer.right(),
            rate,
            p.split_hz,
            band_top(p.correlation_high_hz, rate),
        );
        let guard = correlation_guard(correlation, p.guard_low, p.guard_high);
        let wet = p.wet * guard;

        let mut ms = MidSide::encode(buffer);
        let (low, high) = split_two(&ms.side, rate, p.split_hz);
        let before = rms(&high);
        if before * before < ENERGY_EPSILON || wet <= 0.0 {
            let report = StageReport::skipped(self.name(), "no side high band to shift")
                .metric("correlation", correlation)
                .metric("guard", guard);
            return Ok((buffer.clone(), report));
        }

        let delay_samples = p.delay_ms * rate as f64 / 1000.0;
        let (shifted, renorm) = shift_band(&high, delay_samples, wet);
        for ((side, &lo), &hi) in ms.side.iter_mut().zip(&low).zip(&shifted) {
            *side = lo + hi;
        }

        tracing::debug!(correlation, guard, wet, renorm, "micro-shift");

        let report = StageReport::new(self.name())
            .metric("correlation", correlation)
            .metric("guard", guard)
            .metric("wet", wet)
            .metric("delay_samples", delay_samples)
            .metric("renorm_gain", renorm);
        Ok((ms.decode(), report))
    }
}

//! Sibilance de-emphasis
//!
//! Split-band de-esser on the mid channel: only the sibilance band is
//! compressed, and the change is added back into the full-band signal.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::{band_pass, band_top};
use crate::dsp::envelope::rms_envelope;
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{db_to_linear, linear_to_db};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stereo::MidSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeEssParams {
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub rms_ms: f64,
    pub threshold_db: f64,
    pub ratio: f64,
    pub max_reduction_db: f64,
}

impl Default for DeEssParams {
    fn default() -> Self {
        Self {
            band_low_hz: 5000.0,
            band_high_hz: 9000.0,
            rms_ms: 5.0,
            threshold_db: -30.0,
            ratio: 4.0,
            max_reduction_db: 6.0,
        }
    }
}

impl DeEssParams {
    /// Gain reduction (positive dB) for a band level
    pub fn reduction_db(&self, level_db: f64) -> f64 {
        let over = level_db - self.threshold_db;
        if over <= 0.0 || self.ratio <= 1.0 {
            return 0.0;
        }
        (over * (1.0 - 1.0 / self.ratio)).min(self.max_reduction_db)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeEsser {
    pub params: DeEssParams,
}

impl DeEsser {
    pub fn new(params: DeEssParams) -> Self {
        Self { params }
    }
}

impl Stage for DeEsser {
    fn name(&self) -> &'static str {
        "de_ess"
    }

    fn process(&self, buffer: &AudioBuffer, _ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let mut ms = MidSide::encode(buffer);
        let band = band_pass(&ms.mid, rate, p.band_low_hz, band_top(p.band_high_hz, rate));
        let envelope = rms_envelope(&band, p.rms_ms, rate);

        let mut max_reduction = 0.0_f64;
        let mut active = 0usize;
        for ((mid, &b), &env) in ms.mid.iter_mut().zip(&band).zip(&envelope) {
            let reduction = p.reduction_db(linear_to_db(env));
            if reduction > 0.0 {
                active += 1;
                max_reduction = max_reduction.max(reduction);
                let gain = db_to_linear(-reduction) as f32;
                *mid += (gain - 1.0) * b;
            }
        }
        let active_fraction = active as f64 / band.len() as f64;

        tracing::debug!(max_reduction, active_fraction, "de-ess");

        let report = StageReport::new(self.name())
            .metric("max_reduction_db", max_reduction)
            .metric("active_fraction", active_fraction);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::rms;
    use std::f64::consts::PI;
    use test_case::test_case;

    fn tone(freq: f64, amp: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amp * (2.0 * PI * freq * i as f64 / 48000.0).sin()) as f32)
            .collect()
    }

    #[test_case(-40.0 => 0.0; "below threshold")]
    #[test_case(-26.0 => 3.0; "compressed")]
    #[test_case(-5.0 => 6.0; "capped")]
    fn test_reduction_curve(level_db: f64) -> f64 {
        DeEssParams::default().reduction_db(level_db)
    }

    #[test]
    fn test_reduces_loud_sibilance() {
        let buffer = AudioBuffer::from_mono(tone(7000.0, 0.5, 24000), 48000);
        let (out, report) = DeEsser::default().process(&buffer, &StageContext::default()).unwrap();
        assert!(report.get("max_reduction_db").unwrap() > 5.0);
        assert!(rms(&out.left()[4800..]) < 0.7 * rms(&buffer.left()[4800..]));
    }

    #[test]
    fn test_leaves_low_content_alone() {
        let buffer = AudioBuffer::from_mono(tone(200.0, 0.5, 24000), 48000);
        let (out, report) = DeEsser::default().process(&buffer, &StageContext::default()).unwrap();
        assert_eq!(report.get("max_reduction_db"), Some(0.0));
        assert_eq!(out, buffer);
    }
}

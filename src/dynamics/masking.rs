//! Masking-aware low-mid dip
//!
//! When low-mid energy crowds the presence band, a single bell cut near
//! 300 Hz is applied to the mid channel. With separated stems available the
//! comparison is made between the accompaniment (low-mid) and the vocal
//! (presence), which is where the masking actually happens.

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::{band_pass, band_top, filter_cascade, BiquadCoeffs};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::measure::{mid_signal, rms, smoothstep, ENERGY_EPSILON};
use crate::stage::{Stage, StageContext, StageReport};
use crate::stems::VOCALS;
use crate::stereo::MidSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingParams {
    pub low_mid_low_hz: f64,
    pub low_mid_high_hz: f64,
    pub presence_low_hz: f64,
    pub presence_high_hz: f64,
    /// Low-mid over presence ratio (dB) where the dip starts and saturates
    pub ratio_low_db: f64,
    pub ratio_high_db: f64,
    /// Deepest cut, as a positive number of dB
    pub max_dip_db: f64,
    pub center_hz: f64,
    pub q: f64,
    /// Dips shallower than this are not applied
    pub min_dip_db: f64,
    /// Use vocal/accompaniment stems when they are available
    pub use_stems: bool,
}

impl Default for MaskingParams {
    fn default() -> Self {
        Self {
            low_mid_low_hz: 220.0,
            low_mid_high_hz: 360.0,
            presence_low_hz: 2000.0,
            presence_high_hz: 6000.0,
            ratio_low_db: 0.0,
            ratio_high_db: 12.0,
            max_dip_db: 2.5,
            center_hz: 300.0,
            q: 1.0,
            min_dip_db: 0.05,
            use_stems: true,
        }
    }
}

impl MaskingParams {
    /// Dip depth (dB, zero or negative) for a low-mid/presence ratio in dB
    pub fn dip_for_ratio(&self, ratio_db: f64) -> f64 {
        let span = (self.ratio_high_db - self.ratio_low_db).max(f64::EPSILON);
        -self.max_dip_db * smoothstep((ratio_db - self.ratio_low_db) / span)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaskingDip {
    pub params: MaskingParams,
}

impl MaskingDip {
    pub fn new(params: MaskingParams) -> Self {
        Self { params }
    }

    /// Signals the two bands are measured on, and where they came from
    fn sources(&self, buffer: &AudioBuffer, ctx: &StageContext<'_>) -> (Vec<f32>, Vec<f32>, &'static str) {
        if self.params.use_stems {
            if let Some(stems) = ctx.stems {
                if let (Some(vocals), Some(rest)) = (stems.get(VOCALS), stems.mix_excluding(VOCALS)) {
                    return (mid_signal(&rest), mid_signal(vocals), "stems");
                }
            }
        }
        let mid = mid_signal(buffer);
        (mid.clone(), mid, "mix")
    }
}

impl Stage for MaskingDip {
    fn name(&self) -> &'static str {
        "masking_dip"
    }

    fn process(&self, buffer: &AudioBuffer, ctx: &StageContext<'_>) -> Result<(AudioBuffer, StageReport)> {
        if buffer.is_empty() {
            return Ok((buffer.clone(), StageReport::skipped(self.name(), "empty buffer")));
        }

        let p = &self.params;
        let rate = buffer.sample_rate;
        let (low_source, presence_source, source) = self.sources(buffer, ctx);
        let low_mid = rms(&band_pass(&low_source, rate, p.low_mid_low_hz, p.low_mid_high_hz));
        let presence = rms(&band_pass(
            &presence_source,
            rate,
            p.presence_low_hz,
            band_top(p.presence_high_hz, rate),
        ));

        if low_mid * low_mid < ENERGY_EPSILON || presence * presence < ENERGY_EPSILON {
            let report = StageReport::skipped(self.name(), format!("band energy negligible ({})", source));
            return Ok((buffer.clone(), report));
        }

        let ratio_db = 20.0 * (low_mid / presence).log10();
        let dip_db = p.dip_for_ratio(ratio_db);
        if dip_db.abs() < p.min_dip_db {
            let report = StageReport::skipped(self.name(), format!("dip below threshold ({})", source))
                .metric("ratio_db", ratio_db)
                .metric("dip_db", dip_db);
            return Ok((buffer.clone(), report));
        }

        let mut ms = MidSide::encode(buffer);
        let bell = BiquadCoeffs::peak(rate as f64, p.center_hz, dip_db, p.q);
        ms.mid = filter_cascade(&ms.mid, &[bell]);

        tracing::debug!(ratio_db, dip_db, source, "masking dip");

        let report = StageReport::new(self.name())
            .metric("ratio_db", ratio_db)
            .metric("dip_db", dip_db)
            .with_note(source);
        Ok((ms.decode(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stems::StemSet;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;
    use std::f64::consts::PI;

    fn tone(freq: f64, amp: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amp * (2.0 * PI * freq * i as f64 / 48000.0).sin()) as f32)
            .collect()
    }

    fn mixed(a: &[f32], b: &[f32]) -> Vec<f32> {
        a.iter().zip(b).map(|(x, y)| x + y).collect()
    }

    #[test]
    fn test_dip_curve() {
        let params = MaskingParams::default();
        assert_eq!(params.dip_for_ratio(-6.0), 0.0);
        assert_relative_eq!(params.dip_for_ratio(6.0), -1.25, epsilon = 1e-12);
        assert_eq!(params.dip_for_ratio(20.0), -2.5);
    }

    #[test]
    fn test_muddy_mix_gets_dip() {
        let signal = mixed(&tone(300.0, 0.5, 48000), &tone(3000.0, 0.05, 48000));
        let buffer = AudioBuffer::from_mono(signal, 48000);
        let (out, report) = MaskingDip::default().process(&buffer, &StageContext::default()).unwrap();
        assert!(report.applied);
        assert_relative_eq!(report.get("dip_db").unwrap(), -2.5, epsilon = 1e-9);
        assert!(rms(&out.left()[4800..]) < rms(&buffer.left()[4800..]));
    }

    #[test]
    fn test_bright_mix_is_left_alone() {
        let signal = mixed(&tone(300.0, 0.05, 48000), &tone(3000.0, 0.5, 48000));
        let buffer = AudioBuffer::from_mono(signal, 48000);
        let (out, report) = MaskingDip::default().process(&buffer, &StageContext::default()).unwrap();
        assert!(!report.applied);
        assert_eq!(out, buffer);
    }

    #[test]
    fn test_silence_is_skipped() {
        let buffer = AudioBuffer::new(48000, 48000);
        let (out, report) = MaskingDip::default().process(&buffer, &StageContext::default()).unwrap();
        assert!(!report.applied);
        assert_eq!(out, buffer);
    }

    #[test]
    fn test_stems_drive_the_measurement() {
        // The mix alone looks bright, but the vocal is buried under low-mids
        let len = 48000;
        let mix = AudioBuffer::from_mono(mixed(&tone(300.0, 0.05, len), &tone(3000.0, 0.5, len)), 48000);
        let mut stems = BTreeMap::new();
        stems.insert(VOCALS.to_string(), AudioBuffer::from_mono(tone(3000.0, 0.02, len), 48000));
        stems.insert("other".to_string(), AudioBuffer::from_mono(tone(300.0, 0.4, len), 48000));
        let set = StemSet::new(&mix, stems).unwrap();

        let ctx = StageContext { stems: Some(&set) };
        let (_, report) = MaskingDip::default().process(&mix, &ctx).unwrap();
        assert!(report.applied);
        assert_eq!(report.note.as_deref(), Some("stems"));
    }
}

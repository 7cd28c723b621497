//! Peak Control Chain
//!
//! Oversampled soft clip followed by the lookahead true-peak limiter. The
//! loudness governor runs this chain once per candidate target.

pub mod limiter;
pub mod soft_clip;

pub use limiter::{LimiterParams, LimiterReport, TruePeakLimiter};
pub use soft_clip::{soft_knee, SoftClipParams, SoftClipStats, SoftClipper};

use serde::Serialize;

use crate::engine::AudioBuffer;

/// Result of one pass through the chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakReport {
    pub soft_clip: Option<SoftClipStats>,
    pub limiter: LimiterReport,
}

/// Soft clip (optional) then true-peak limiting against one ceiling
#[derive(Debug, Clone)]
pub struct PeakChain {
    soft_clip: Option<SoftClipper>,
    limiter: TruePeakLimiter,
}

impl PeakChain {
    pub fn new(ceiling_db: f64, soft_clip: Option<SoftClipParams>, limiter: LimiterParams) -> Self {
        Self {
            soft_clip: soft_clip.map(|params| SoftClipper::new(params, ceiling_db)),
            limiter: TruePeakLimiter::new(limiter, ceiling_db),
        }
    }

    pub fn ceiling_db(&self) -> f64 {
        self.limiter.ceiling_db()
    }

    pub fn process(&self, buffer: &AudioBuffer) -> (AudioBuffer, PeakReport) {
        let (clipped, soft_clip) = match &self.soft_clip {
            Some(clipper) => {
                let (out, stats) = clipper.process(buffer);
                (out, Some(stats))
            }
            None => (buffer.clone(), None),
        };
        let (limited, limiter) = self.limiter.process(&clipped);
        (limited, PeakReport { soft_clip, limiter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_chain_holds_ceiling() {
        let signal: Vec<f32> = (0..48000)
            .map(|i| (1.4 * (2.0 * PI * 220.0 * i as f64 / 48000.0).sin()) as f32)
            .collect();
        let buffer = AudioBuffer::from_mono(signal, 48000);
        let chain = PeakChain::new(-1.0, Some(SoftClipParams::default()), LimiterParams::default());
        let (out, report) = chain.process(&buffer);
        assert!(report.soft_clip.is_some());
        assert!(report.limiter.true_peak_db <= -1.0 + 1e-3);
        assert_eq!(out.len(), buffer.len());
    }

    #[test]
    fn test_chain_without_soft_clip() {
        let buffer = AudioBuffer::from_mono(vec![0.1; 4800], 48000);
        let chain = PeakChain::new(-1.0, None, LimiterParams::default());
        let (out, report) = chain.process(&buffer);
        assert!(report.soft_clip.is_none());
        assert_eq!(out, buffer);
    }
}

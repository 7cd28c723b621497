//! Loudness Governor
//!
//! Binary search over loudness targets. Each candidate is gain-normalised,
//! run through the peak chain and measured; a candidate is accepted when the
//! limiter stayed above the gain-reduction floor and the true peak stayed
//! within tolerance of the ceiling. Accepting moves the search louder,
//! rejecting moves it quieter, and the loudest accepted candidate wins.

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::measure::{db_to_linear, integrated_loudness, LOUDNESS_FLOOR_LUFS, MIN_DB};
use crate::peak::PeakChain;
use crate::pipeline::CancellationToken;

// ============================================================================
// Parameters and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorParams {
    /// How far above the preset target the search may go (dB)
    pub headroom_db: f64,
    /// Number of candidates evaluated
    pub steps: usize,
    /// Spacing used to place the lower bound: target - steps * step_db
    pub step_db: f64,
    /// Minimum limiter gain must stay strictly above this (dB)
    pub gr_floor_db: f64,
    /// Allowed true-peak overshoot of the ceiling (dB)
    pub tp_tolerance_db: f64,
}

impl Default for GovernorParams {
    fn default() -> Self {
        Self {
            headroom_db: 0.0,
            steps: 8,
            step_db: 0.5,
            gr_floor_db: -6.0,
            tp_tolerance_db: 0.1,
        }
    }
}

/// One evaluated candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GovernorStep {
    pub target_lufs: f64,
    pub achieved_lufs: f64,
    pub true_peak_db: f64,
    pub min_gain_db: f64,
    pub accepted: bool,
}

/// The chosen candidate and the search trace
#[derive(Debug, Clone)]
pub struct GovernorResult {
    pub buffer: AudioBuffer,
    pub target_lufs: f64,
    pub achieved_lufs: f64,
    pub true_peak_db: f64,
    pub min_gain_db: f64,
    /// False when no candidate met both constraints (quietest returned) or
    /// the input was silent
    pub converged: bool,
    pub steps: Vec<GovernorStep>,
}

impl GovernorResult {
    /// Everything but the audio, for the diagnostics record
    pub fn summary(&self) -> GovernorSummary {
        GovernorSummary {
            target_lufs: self.target_lufs,
            achieved_lufs: self.achieved_lufs,
            true_peak_db: self.true_peak_db,
            min_gain_db: self.min_gain_db,
            converged: self.converged,
            steps: self.steps.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorSummary {
    pub target_lufs: f64,
    pub achieved_lufs: f64,
    pub true_peak_db: f64,
    pub min_gain_db: f64,
    pub converged: bool,
    pub steps: Vec<GovernorStep>,
}

// ============================================================================
// Governor
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoudnessGovernor {
    target_lufs: f64,
    params: GovernorParams,
    chain: PeakChain,
}

impl LoudnessGovernor {
    pub fn new(target_lufs: f64, params: GovernorParams, chain: PeakChain) -> Self {
        Self {
            target_lufs,
            params,
            chain,
        }
    }

    /// Initial (low, high) search bounds
    pub fn bounds(&self) -> (f64, f64) {
        let high = self.target_lufs + self.params.headroom_db;
        let low = self.target_lufs - self.params.steps as f64 * self.params.step_db;
        if low > high {
            (high, low)
        } else {
            (low, high)
        }
    }

    fn accepts(&self, true_peak_db: f64, min_gain_db: f64) -> bool {
        min_gain_db > self.params.gr_floor_db
            && true_peak_db <= self.chain.ceiling_db() + self.params.tp_tolerance_db
    }

    /// Normalise to `target_lufs`, run the peak chain and measure
    fn evaluate(&self, buffer: &AudioBuffer, input_lufs: f64, target_lufs: f64) -> (AudioBuffer, GovernorStep) {
        let mut gained = buffer.clone();
        gained.apply_gain(db_to_linear(target_lufs - input_lufs) as f32);
        let (limited, report) = self.chain.process(&gained);
        let achieved_lufs = integrated_loudness(&limited);
        let step = GovernorStep {
            target_lufs,
            achieved_lufs,
            true_peak_db: report.limiter.true_peak_db,
            min_gain_db: report.limiter.min_gain_db,
            accepted: self.accepts(report.limiter.true_peak_db, report.limiter.min_gain_db),
        };
        (limited, step)
    }

    /// Search for the loudest safe target
    ///
    /// # Errors
    /// `Cancelled` if the token is set before any search step.
    pub fn run(&self, buffer: &AudioBuffer, cancel: &CancellationToken) -> Result<GovernorResult> {
        let input_lufs = integrated_loudness(buffer);
        if input_lufs <= LOUDNESS_FLOOR_LUFS {
            tracing::info!("governor: input is silent, nothing to normalise");
            return Ok(GovernorResult {
                buffer: buffer.clone(),
                target_lufs: self.target_lufs,
                achieved_lufs: input_lufs,
                true_peak_db: MIN_DB,
                min_gain_db: 0.0,
                converged: false,
                steps: Vec::new(),
            });
        }

        let (mut low, mut high) = self.bounds();
        let mut steps = Vec::with_capacity(self.params.steps);
        let mut best: Option<(AudioBuffer, GovernorStep)> = None;
        let mut quietest: Option<(AudioBuffer, GovernorStep)> = None;

        for _ in 0..self.params.steps.max(1) {
            if cancel.is_cancelled() {
                return Err(MasterError::Cancelled {
                    stage: "governor".to_string(),
                });
            }

            let mid = 0.5 * (low + high);
            let (candidate, step) = self.evaluate(buffer, input_lufs, mid);
            tracing::debug!(
                target = step.target_lufs,
                achieved = step.achieved_lufs,
                true_peak = step.true_peak_db,
                min_gain = step.min_gain_db,
                accepted = step.accepted,
                "governor step"
            );
            steps.push(step);

            if step.accepted {
                low = mid;
                if best.as_ref().map_or(true, |(_, b)| step.target_lufs > b.target_lufs) {
                    best = Some((candidate, step));
                }
            } else {
                high = mid;
                if quietest.as_ref().map_or(true, |(_, q)| step.target_lufs < q.target_lufs) {
                    quietest = Some((candidate, step));
                }
            }
        }

        let converged = best.is_some();
        let Some((buffer, chosen)) = best.or(quietest) else {
            return Err(MasterError::ProcessingError {
                reason: "governor evaluated no candidates".to_string(),
            });
        };

        if converged {
            tracing::info!(
                target = chosen.target_lufs,
                achieved = chosen.achieved_lufs,
                true_peak = chosen.true_peak_db,
                "governor converged"
            );
        } else {
            tracing::warn!(
                target = chosen.target_lufs,
                min_gain = chosen.min_gain_db,
                "governor found no safe candidate, using the quietest"
            );
        }

        Ok(GovernorResult {
            buffer,
            target_lufs: chosen.target_lufs,
            achieved_lufs: chosen.achieved_lufs,
            true_peak_db: chosen.true_peak_db,
            min_gain_db: chosen.min_gain_db,
            converged,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_sine_sweep;
    use crate::peak::{LimiterParams, SoftClipParams};
    use crate::measure::true_peak_db;
    use test_case::test_case;

    fn governor(target: f64, ceiling: f64, params: GovernorParams) -> LoudnessGovernor {
        let chain = PeakChain::new(ceiling, Some(SoftClipParams::default()), LimiterParams::default());
        LoudnessGovernor::new(target, params, chain)
    }

    #[test]
    fn test_bounds() {
        let gov = governor(-14.0, -1.0, GovernorParams::default());
        assert_eq!(gov.bounds(), (-18.0, -14.0));

        let inverted = GovernorParams {
            headroom_db: -5.0,
            steps: 2,
            ..GovernorParams::default()
        };
        assert_eq!(governor(-14.0, -1.0, inverted).bounds(), (-19.0, -15.0));
    }

    #[test]
    fn test_converges_near_target_without_limiting() {
        let sweep = generate_sine_sweep(40.0, 16000.0, 0.25, 3.0, 48000);
        let result = governor(-14.0, -1.0, GovernorParams::default())
            .run(&sweep, &CancellationToken::new())
            .unwrap();
        assert!(result.converged);
        assert_eq!(result.steps.len(), 8);
        assert!((result.achieved_lufs - -14.0).abs() < 0.1, "achieved {}", result.achieved_lufs);
        assert!(result.true_peak_db <= -0.9);
    }

    #[test_case(-14.0, -1.0; "streaming")]
    #[test_case(-9.0, -0.8; "club")]
    #[test_case(-6.0, -1.0; "very loud")]
    fn test_result_is_always_safe_when_converged(target: f64, ceiling: f64) {
        let sweep = generate_sine_sweep(30.0, 18000.0, 0.9, 2.0, 48000);
        let params = GovernorParams {
            headroom_db: 0.5,
            ..GovernorParams::default()
        };
        let result = governor(target, ceiling, params)
            .run(&sweep, &CancellationToken::new())
            .unwrap();
        if result.converged {
            assert!(result.min_gain_db > params.gr_floor_db);
            assert!(result.true_peak_db <= ceiling + params.tp_tolerance_db);
            assert!(true_peak_db(&result.buffer) <= ceiling + params.tp_tolerance_db);
        }
        // Accepted steps only ever move the search louder
        let accepted: Vec<f64> = result
            .steps
            .iter()
            .filter(|s| s.accepted)
            .map(|s| s.target_lufs)
            .collect();
        assert!(accepted.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_impossible_floor_falls_back_to_quietest() {
        let sweep = generate_sine_sweep(30.0, 18000.0, 0.9, 1.0, 48000);
        let params = GovernorParams {
            // Any gain reduction at all is rejected
            gr_floor_db: 0.0,
            ..GovernorParams::default()
        };
        let result = governor(0.0, -1.0, params)
            .run(&sweep, &CancellationToken::new())
            .unwrap();
        assert!(!result.converged);
        let quietest = result
            .steps
            .iter()
            .map(|s| s.target_lufs)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.target_lufs, quietest);
    }

    #[test]
    fn test_silence_short_circuits() {
        let silence = AudioBuffer::new(96000, 48000);
        let result = governor(-14.0, -1.0, GovernorParams::default())
            .run(&silence, &CancellationToken::new())
            .unwrap();
        assert!(!result.converged);
        assert!(result.steps.is_empty());
        assert!(result.buffer.is_silent());
    }

    #[test]
    fn test_cancellation_stops_search() {
        let sweep = generate_sine_sweep(40.0, 16000.0, 0.5, 1.0, 48000);
        let token = CancellationToken::new();
        token.cancel();
        let err = governor(-14.0, -1.0, GovernorParams::default())
            .run(&sweep, &token)
            .unwrap_err();
        assert!(matches!(err, MasterError::Cancelled { ref stage } if stage == "governor"));
    }
}

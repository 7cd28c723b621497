//! Whole-program metrics for the job report

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::measure::{
    buffer_peak, crest_factor_db, integrated_loudness, linear_to_db, mid_signal, true_peak_db,
};

/// Summary levels of a buffer, measured before and after mastering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramMetrics {
    /// Approximate integrated loudness (LUFS)
    pub estimated_lufs: f64,
    /// Oversampled true peak (dBTP)
    pub true_peak_dbtp: f64,
    /// Sample peak (dBFS)
    pub sample_peak_dbfs: f64,
    /// Peak-to-RMS ratio of the mid channel (dB)
    pub crest_factor_db: f64,
    /// Spread between the 95th and 10th percentile of |mid| (linear)
    pub dynamic_range_p95_p10: f64,
}

impl ProgramMetrics {
    pub fn measure(buffer: &AudioBuffer) -> Self {
        let mid = mid_signal(buffer);
        let mut magnitudes: Vec<f64> = mid.iter().map(|&s| (s as f64).abs()).collect();
        magnitudes.sort_by(|a, b| a.total_cmp(b));

        Self {
            estimated_lufs: integrated_loudness(buffer),
            true_peak_dbtp: true_peak_db(buffer),
            sample_peak_dbfs: linear_to_db(buffer_peak(buffer)),
            crest_factor_db: crest_factor_db(&mid),
            dynamic_range_p95_p10: percentile_sorted(&magnitudes, 95.0)
                - percentile_sorted(&magnitudes, 10.0),
        }
    }

    /// Copy rounded for display (2 decimals, 5 for the linear spread)
    pub fn rounded(&self) -> Self {
        let round = |v: f64, places: i32| {
            let scale = 10.0_f64.powi(places);
            (v * scale).round() / scale
        };
        Self {
            estimated_lufs: round(self.estimated_lufs, 2),
            true_peak_dbtp: round(self.true_peak_dbtp, 2),
            sample_peak_dbfs: round(self.sample_peak_dbfs, 2),
            crest_factor_db: round(self.crest_factor_db, 2),
            dynamic_range_p95_p10: round(self.dynamic_range_p95_p10, 5),
        }
    }
}

/// Percentile with linear interpolation between closest ranks
///
/// `sorted` must be ascending. Returns 0.0 for an empty slice.
pub fn percentile_sorted(sorted: &[f64], percent: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (percent.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use crate::measure::{LOUDNESS_FLOOR_LUFS, MIN_DB};

    #[test]
    fn test_percentile_interpolates() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&values, 50.0), 2.0);
        assert!((percentile_sorted(&values, 95.0) - 3.8).abs() < 1e-12);
        assert_eq!(percentile_sorted(&[], 50.0), 0.0);
    }

    #[test]
    fn test_tone_metrics() {
        let metrics = ProgramMetrics::measure(&generate_test_tone(1000.0, 0.5, 1.0, 48000));
        assert!((metrics.sample_peak_dbfs + 6.02).abs() < 0.05);
        assert!((metrics.crest_factor_db - 3.01).abs() < 0.05);
        assert!(metrics.true_peak_dbtp >= metrics.sample_peak_dbfs);
        assert!(metrics.dynamic_range_p95_p10 > 0.3);
    }

    #[test]
    fn test_silence_metrics() {
        let metrics = ProgramMetrics::measure(&AudioBuffer::new(4800, 48000));
        assert_eq!(metrics.estimated_lufs, LOUDNESS_FLOOR_LUFS);
        assert_eq!(metrics.sample_peak_dbfs, MIN_DB);
        assert_eq!(metrics.crest_factor_db, 0.0);
        assert_eq!(metrics.dynamic_range_p95_p10, 0.0);
    }

    #[test]
    fn test_rounded() {
        let metrics = ProgramMetrics {
            estimated_lufs: -14.0349,
            true_peak_dbtp: -1.004,
            sample_peak_dbfs: -1.2,
            crest_factor_db: 9.876,
            dynamic_range_p95_p10: 0.1234567,
        };
        let rounded = metrics.rounded();
        assert_eq!(rounded.estimated_lufs, -14.03);
        assert_eq!(rounded.crest_factor_db, 9.88);
        assert_eq!(rounded.dynamic_range_p95_p10, 0.12346);
    }
}

//! Band correlation and the correlation guard

use crate::dsp::biquad::band_pass;
use crate::measure::{smoothstep, ENERGY_EPSILON};

/// Pearson correlation of two equal-length slices
///
/// Returns 0.0 when either side carries negligible energy or the statistic is
/// undefined, so callers never see NaN.
pub fn pearson(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let mean_a = a[..n].iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().map(|&x| x as f64).sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let floor = ENERGY_EPSILON * n as f64;
    if var_a < floor || var_b < floor {
        return 0.0;
    }

    let r = cov / (var_a * var_b).sqrt();
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Correlation of left and right inside `[low_hz, high_hz]`
pub fn band_correlation(left: &[f32], right: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> f64 {
    let l = band_pass(left, sample_rate, low_hz, high_hz);
    let r = band_pass(right, sample_rate, low_hz, high_hz);
    pearson(&l, &r)
}

/// Map a correlation to a 0..1 enable factor
///
/// 0 at or below `low` (already wide or phasey material), 1 at or above
/// `high`, smooth in between. Degenerate thresholds collapse to a step at
/// `low`.
pub fn correlation_guard(correlation: f64, low: f64, high: f64) -> f64 {
    if !correlation.is_finite() {
        return 0.0;
    }
    if high <= low {
        return if correlation > low { 1.0 } else { 0.0 };
    }
    smoothstep((correlation - low) / (high - low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sine(freq: f64, phase: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / 48000.0 + phase).sin() as f32)
            .collect()
    }

    #[test]
    fn test_identical_channels_fully_correlated() {
        let x = sine(1000.0, 0.0, 48000);
        let c = band_correlation(&x, &x, 48000, 300.0, 16000.0);
        assert!((c - 1.0).abs() < 1e-9, "correlation {}", c);
    }

    #[test]
    fn test_inverted_channels_anticorrelated() {
        let x = sine(1000.0, 0.0, 48000);
        let y: Vec<f32> = x.iter().map(|s| -s).collect();
        assert!((pearson(&x, &y) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quadrature_is_uncorrelated() {
        let x = sine(1000.0, 0.0, 48000);
        let y = sine(1000.0, std::f64::consts::FRAC_PI_2, 48000);
        assert!(pearson(&x, &y).abs() < 0.01);
    }

    #[test]
    fn test_silent_channel_is_zero() {
        let x = sine(1000.0, 0.0, 4800);
        let silent = vec![0.0_f32; 4800];
        assert_eq!(pearson(&x, &silent), 0.0);
        assert_eq!(band_correlation(&silent, &silent, 48000, 300.0, 16000.0), 0.0);
    }

    #[test]
    fn test_guard_thresholds() {
        assert_eq!(correlation_guard(0.2, 0.2, 0.6), 0.0);
        assert_eq!(correlation_guard(0.0, 0.2, 0.6), 0.0);
        assert_eq!(correlation_guard(-1.0, 0.2, 0.6), 0.0);
        assert_eq!(correlation_guard(0.6, 0.2, 0.6), 1.0);
        assert_eq!(correlation_guard(1.0, 0.2, 0.6), 1.0);
        let mid = correlation_guard(0.4, 0.2, 0.6);
        assert!((mid - 0.5).abs() < 1e-12);
        assert_eq!(correlation_guard(f64::NAN, 0.2, 0.6), 0.0);
    }

    proptest! {
        #[test]
        fn prop_guard_is_bounded(c in -1.0e6f64..1.0e6, low in -1.0f64..1.0, width in 0.0f64..1.0) {
            let g = correlation_guard(c, low, low + width);
            prop_assert!((0.0..=1.0).contains(&g));
        }

        #[test]
        fn prop_pearson_is_bounded(a in prop::collection::vec(-1.0f32..1.0, 2..64),
                                   b in prop::collection::vec(-1.0f32..1.0, 2..64)) {
            let r = pearson(&a, &b);
            prop_assert!(r.is_finite());
            prop_assert!((-1.0..=1.0).contains(&r));
        }
    }
}

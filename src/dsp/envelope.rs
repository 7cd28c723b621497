//! Envelope followers and windowed statistics
//!
//! Every follower here is a sequential scan over the sample sequence that
//! starts from a zero state.

use std::collections::VecDeque;

/// Calculate a one-pole smoothing coefficient from a time constant
///
/// A non-positive time yields 0.0 (the follower tracks its input instantly).
#[inline]
pub fn time_to_coeff(time_ms: f64, sample_rate: u32) -> f64 {
    let samples = time_ms * sample_rate as f64 / 1000.0;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// One-pole follower with separate rise (attack) and fall (release) coefficients
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    state: f64,
}

impl EnvelopeFollower {
    pub fn new(attack_ms: f64, release_ms: f64, sample_rate: u32) -> Self {
        Self {
            attack_coeff: time_to_coeff(attack_ms, sample_rate),
            release_coeff: time_to_coeff(release_ms, sample_rate),
            state: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let coeff = if input > self.state {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.state = coeff * self.state + (1.0 - coeff) * input;
        self.state
    }

    /// Run the follower over a whole sequence
    pub fn scan(mut self, input: impl IntoIterator<Item = f64>) -> Vec<f64> {
        input.into_iter().map(|x| self.process(x)).collect()
    }
}

/// Peak envelope of |x| with attack/release smoothing
pub fn peak_envelope(samples: &[f32], attack_ms: f64, release_ms: f64, sample_rate: u32) -> Vec<f64> {
    EnvelopeFollower::new(attack_ms, release_ms, sample_rate)
        .scan(samples.iter().map(|&s| (s as f64).abs()))
}

/// RMS envelope: one-pole mean of x^2, then square root
pub fn rms_envelope(samples: &[f32], time_ms: f64, sample_rate: u32) -> Vec<f64> {
    EnvelopeFollower::new(time_ms, time_ms, sample_rate)
        .scan(samples.iter().map(|&s| (s as f64) * (s as f64)))
        .into_iter()
        .map(|ms| ms.max(0.0).sqrt())
        .collect()
}

/// Maximum over the forward window `[n, n + window]` for every n
///
/// Uses a monotonic deque so the cost is linear in the input length.
pub fn moving_max_forward(values: &[f64], window: usize) -> Vec<f64> {
    let len = values.len();
    let mut output = vec![0.0; len];
    let mut deque: VecDeque<usize> = VecDeque::new();

    // Walk backwards so the deque holds candidates from the future
    for n in (0..len).rev() {
        while let Some(&back) = deque.back() {
            if values[back] <= values[n] {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(n);

        while let Some(&front) = deque.front() {
            if front > n + window {
                deque.pop_front();
            } else {
                break;
            }
        }

        output[n] = deque.front().map(|&i| values[i]).unwrap_or(0.0);
    }

    output
}

/// Centred moving average; edges average over the samples that exist
pub fn moving_average(values: &[f64], width: usize) -> Vec<f64> {
    let len = values.len();
    if len == 0 || width <= 1 {
        return values.to_vec();
    }

    let half_left = (width - 1) / 2;
    let half_right = width - 1 - half_left;

    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0.0);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..len)
        .map(|n| {
            let start = n.saturating_sub(half_left);
            let end = (n + half_right + 1).min(len);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_time_to_coeff_range() {
        let coeff = time_to_coeff(10.0, 48000);
        assert!(coeff > 0.0 && coeff < 1.0);
        assert_eq!(time_to_coeff(0.0, 48000), 0.0);
    }

    #[test]
    fn test_follower_tracks_step() {
        let env = peak_envelope(&vec![1.0; 48000], 1.0, 100.0, 48000);
        assert!(env[4800] > 0.99, "attack should settle quickly: {}", env[4800]);
    }

    #[test]
    fn test_follower_releases_slowly() {
        let mut input = vec![1.0_f32; 480];
        input.extend(vec![0.0_f32; 480]);
        let env = peak_envelope(&input, 0.0, 100.0, 48000);
        // 10 ms into a 100 ms release the envelope is still high
        assert!(env[959] > 0.85, "release too fast: {}", env[959]);
    }

    #[test]
    fn test_rms_envelope_of_constant() {
        let env = rms_envelope(&vec![0.5; 48000], 5.0, 48000);
        assert_relative_eq!(env[47999], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_moving_max_forward() {
        let values = [0.0, 1.0, 0.0, 0.0, 3.0, 0.0, 0.0];
        let max = moving_max_forward(&values, 2);
        assert_eq!(max, vec![1.0, 1.0, 3.0, 3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_moving_max_zero_window_is_identity() {
        let values = [0.2, 0.1, 0.4];
        assert_eq!(moving_max_forward(&values, 0), values.to_vec());
    }

    #[test]
    fn test_moving_average_edges() {
        let values = [3.0, 0.0, 0.0, 3.0];
        let avg = moving_average(&values, 3);
        assert_relative_eq!(avg[0], 1.5);
        assert_relative_eq!(avg[1], 1.0);
        assert_relative_eq!(avg[3], 1.5);
    }
}

//! Stem separation collaborator
//!
//! Source separation is an optional external capability. The engine asks a
//! [`StemSeparator`] whether it is available before using it, and any
//! failure degrades to processing the mixed buffer.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::engine::AudioBuffer;

/// Name of the stem that carries the lead vocal
pub const VOCALS: &str = "vocals";

/// Failures reported by a separator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StemError {
    #[error("Stem separator '{0}' is not available")]
    Unavailable(String),

    #[error("Stem separation failed: {0}")]
    Failed(String),

    #[error("Stem '{stem}' does not match the mix: {reason}")]
    Mismatch { stem: String, reason: String },
}

/// Per-instrument buffers with the mix's length, channel count and sample rate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StemSet {
    stems: BTreeMap<String, AudioBuffer>,
}

impl StemSet {
    /// Build a stem set, checking every stem against the mix it came from
    pub fn new(mix: &AudioBuffer, stems: BTreeMap<String, AudioBuffer>) -> Result<Self, StemError> {
        for (name, stem) in &stems {
            let reason = if stem.sample_rate != mix.sample_rate {
                Some(format!("sample rate {} != {}", stem.sample_rate, mix.sample_rate))
            } else if stem.channels() != mix.channels() {
                Some(format!("{} channels != {}", stem.channels(), mix.channels()))
            } else if stem.len() != mix.len() {
                Some(format!("{} samples != {}", stem.len(), mix.len()))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(StemError::Mismatch {
                    stem: name.clone(),
                    reason,
                });
            }
        }
        Ok(Self { stems })
    }

    pub fn get(&self, name: &str) -> Option<&AudioBuffer> {
        self.stems.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Sum of every stem except `excluded`; `None` if nothing remains
    pub fn mix_excluding(&self, excluded: &str) -> Option<AudioBuffer> {
        let mut sum: Option<AudioBuffer> = None;
        for (_, stem) in self.stems.iter().filter(|(name, _)| name.as_str() != excluded) {
            match sum.as_mut() {
                None => sum = Some(stem.clone()),
                Some(acc) => {
                    for (dst, src) in acc.samples.iter_mut().zip(&stem.samples) {
                        for (d, s) in dst.iter_mut().zip(src) {
                            *d += s;
                        }
                    }
                }
            }
        }
        sum
    }
}

/// External source separation capability
pub trait StemSeparator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `separate` can run in this process
    fn available(&self) -> bool;

    fn separate(&self, mix: &AudioBuffer) -> Result<StemSet, StemError>;
}

/// Separator used when no separation backend is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSeparator;

impl StemSeparator for NullSeparator {
    fn name(&self) -> &str {
        "none"
    }

    fn available(&self) -> bool {
        false
    }

    fn separate(&self, _mix: &AudioBuffer) -> Result<StemSet, StemError> {
        Err(StemError::Unavailable(self.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, len: usize, rate: u32) -> AudioBuffer {
        AudioBuffer::from_mono(vec![value; len], rate)
    }

    #[test]
    fn test_null_separator_is_unavailable() {
        let separator = NullSeparator;
        assert!(!separator.available());
        assert_eq!(
            separator.separate(&buffer(0.0, 10, 48000)),
            Err(StemError::Unavailable("none".to_string()))
        );
    }

    #[test]
    fn test_stem_set_validates_shape() {
        let mix = buffer(0.0, 100, 48000);
        let mut stems = BTreeMap::new();
        stems.insert(VOCALS.to_string(), buffer(0.1, 100, 48000));
        assert!(StemSet::new(&mix, stems.clone()).is_ok());

        stems.insert("drums".to_string(), buffer(0.1, 99, 48000));
        let err = StemSet::new(&mix, stems.clone()).unwrap_err();
        assert!(matches!(err, StemError::Mismatch { ref stem, .. } if stem == "drums"));

        stems.insert("drums".to_string(), buffer(0.1, 100, 44100));
        assert!(StemSet::new(&mix, stems).is_err());
    }

    #[test]
    fn test_mix_excluding_sums_the_rest() {
        let mix = buffer(0.0, 4, 48000);
        let mut stems = BTreeMap::new();
        stems.insert(VOCALS.to_string(), buffer(0.5, 4, 48000));
        stems.insert("drums".to_string(), buffer(0.25, 4, 48000));
        stems.insert("bass".to_string(), buffer(0.125, 4, 48000));
        let set = StemSet::new(&mix, stems).unwrap();

        let rest = set.mix_excluding(VOCALS).unwrap();
        assert!(rest.left().iter().all(|&v| v == 0.375));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["bass", "drums", "vocals"]);
    }

    #[test]
    fn test_mix_excluding_only_stem() {
        let mix = buffer(0.0, 4, 48000);
        let mut stems = BTreeMap::new();
        stems.insert(VOCALS.to_string(), buffer(0.5, 4, 48000));
        let set = StemSet::new(&mix, stems).unwrap();
        assert!(set.mix_excluding(VOCALS).is_none());
    }
}

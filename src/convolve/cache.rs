//! Shared cache of filter spectra
//!
//! Frequency responses are keyed by tap count, transform size and the tap
//! fingerprint. Entries are immutable once published (`Arc<[Complex<f64>]>`),
//! so concurrent jobs only contend on the short map lookup.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use num_complex::Complex;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{MasterError, Result};

/// Default number of cached spectra
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Published, read-only filter spectrum
pub type FilterSpectrum = Arc<[Complex<f64>]>;

/// Cache key: identical keys always describe identical spectra
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpectrumKey {
    pub taps: usize,
    pub fft_size: usize,
    pub fingerprint: String,
}

impl SpectrumKey {
    /// Number of complex bins a spectrum for this key must hold
    pub fn expected_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Hit/miss counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Bounded LRU cache of filter spectra, safe to share across jobs
#[derive(Debug)]
pub struct SpectrumCache {
    entries: Mutex<LruCache<SpectrumKey, FilterSpectrum>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for SpectrumCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl SpectrumCache {
    /// Create a cache holding at most `capacity` spectra (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a spectrum, building and publishing it on a miss
    ///
    /// The builder runs outside the lock. Returns the spectrum and whether
    /// it came from the cache.
    ///
    /// # Errors
    /// `CacheCorrupted` if a cached entry does not have the bin count its key
    /// implies; the builder's own errors are passed through.
    pub fn get_or_try_insert<F>(&self, key: &SpectrumKey, build: F) -> Result<(FilterSpectrum, bool)>
    where
        F: FnOnce() -> Result<Vec<Complex<f64>>>,
    {
        let cached = self.entries.lock().get(key).cloned();
        if let Some(spectrum) = cached {
            if spectrum.len() != key.expected_bins() {
                return Err(MasterError::CacheCorrupted {
                    reason: format!(
                        "entry for {} taps / fft {} holds {} bins, expected {}",
                        key.taps,
                        key.fft_size,
                        spectrum.len(),
                        key.expected_bins()
                    ),
                });
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((spectrum, true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let spectrum: FilterSpectrum = build()?.into();
        self.entries.lock().put(key.clone(), Arc::clone(&spectrum));
        Ok((spectrum, false))
    }

    /// Publish a spectrum directly
    pub fn insert(&self, key: SpectrumKey, spectrum: FilterSpectrum) {
        self.entries.lock().put(key, spectrum);
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fingerprint: &str) -> SpectrumKey {
        SpectrumKey {
            taps: 3,
            fft_size: 8,
            fingerprint: fingerprint.to_string(),
        }
    }

    fn spectrum(bins: usize) -> Vec<Complex<f64>> {
        vec![Complex::new(1.0, 0.0); bins]
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = SpectrumCache::new(4);
        let (_, hit) = cache.get_or_try_insert(&key("a"), || Ok(spectrum(5))).unwrap();
        assert!(!hit);
        let (cached, hit) = cache
            .get_or_try_insert(&key("a"), || panic!("builder must not run on a hit"))
            .unwrap();
        assert!(hit);
        assert_eq!(cached.len(), 5);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_eviction_is_bounded() {
        let cache = SpectrumCache::new(2);
        for name in ["a", "b", "c"] {
            cache.get_or_try_insert(&key(name), || Ok(spectrum(5))).unwrap();
        }
        assert_eq!(cache.len(), 2);
        // Least recently used entry went first
        let (_, hit) = cache.get_or_try_insert(&key("a"), || Ok(spectrum(5))).unwrap();
        assert!(!hit);
    }

    #[test]
    fn test_corrupted_entry_is_fatal() {
        let cache = SpectrumCache::new(2);
        cache.insert(key("bad"), spectrum(3).into());
        let result = cache.get_or_try_insert(&key("bad"), || Ok(spectrum(5)));
        assert!(matches!(result, Err(MasterError::CacheCorrupted { .. })));
    }

    #[test]
    fn test_builder_error_is_not_cached() {
        let cache = SpectrumCache::new(2);
        let result = cache.get_or_try_insert(&key("x"), || {
            Err(MasterError::ProcessingError {
                reason: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_resets() {
        let cache = SpectrumCache::new(2);
        cache.get_or_try_insert(&key("a"), || Ok(spectrum(5))).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        assert_eq!(SpectrumCache::new(0).stats().capacity, 1);
    }

    #[test]
    fn test_concurrent_lookups() {
        let cache = Arc::new(SpectrumCache::new(8));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cache.get_or_try_insert(&key("shared"), || Ok(spectrum(5))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 200);
        assert_eq!(stats.entries, 1);
    }
}

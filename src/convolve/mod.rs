//! Streaming FIR convolution
//!
//! [`ConvolutionEngine`] applies designed filters to long buffers; filter
//! spectra are shared between jobs through an injected [`SpectrumCache`].

pub mod cache;
pub mod engine;

pub use cache::{CacheStats, FilterSpectrum, SpectrumCache, SpectrumKey, DEFAULT_CACHE_CAPACITY};
pub use engine::{convolve_direct, fft_size_for, Alignment, ConvolutionEngine};

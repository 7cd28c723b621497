//! DSP building blocks
//!
//! Filters, envelope followers, oversampling and FFT helpers shared by the
//! measurement code and every processing stage.

pub mod biquad;
pub mod envelope;
pub mod oversample;
pub mod spectrum;

pub use biquad::{BiquadCoeffs, BiquadState};
pub use envelope::{EnvelopeFollower, time_to_coeff};
pub use oversample::Oversampler;

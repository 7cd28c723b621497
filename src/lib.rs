//! AuralMind - Offline Mastering Engine
//!
//! Takes a target recording (and optionally a reference) and produces a
//! master matched to a tonal and loudness target under a true-peak ceiling.
//!
//! # Architecture
//!
//! Buffers flow through one job in sequence:
//! - Curve EQ: reference-matched or translation curve, linear-phase FIR,
//!   applied by the overlap-save convolver with a shared spectrum cache
//! - Stereo field stages: mono-sub, widening, micro-shift, micro-detail
//! - Dynamic stages: masking dip, de-esser, harmonics, transients, section lift
//! - Loudness governor: binary search over targets, each candidate run
//!   through soft clip and the true-peak limiter
//!
//! Every job returns the mastered buffer and a [`StageDiagnostics`] record.

pub mod cli;
pub mod convolve;
pub mod diagnostics;
pub mod dsp;
pub mod dynamics;
pub mod engine;
pub mod eq;
pub mod error;
pub mod governor;
pub mod measure;
pub mod peak;
pub mod pipeline;
pub mod preset;
pub mod stage;
pub mod stems;
pub mod stereo;

pub use convolve::{Alignment, ConvolutionEngine, SpectrumCache};
pub use diagnostics::StageDiagnostics;
pub use engine::AudioBuffer;
pub use error::{MasterError, Result};
pub use governor::{GovernorParams, GovernorResult, LoudnessGovernor};
pub use peak::PeakChain;
pub use pipeline::{CancellationToken, MasteringEngine, MasteringJob, MasteringOutput};
pub use preset::{Preset, PresetOverrides};
pub use stage::{Stage, StageContext, StageReport};
pub use stems::{NullSeparator, StemError, StemSeparator, StemSet};

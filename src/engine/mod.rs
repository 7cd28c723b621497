//! Audio Engine Module
//!
//! Core buffer type and the WAV adapters around it:
//! - Audio buffer management
//! - File I/O operations

pub mod buffer;
pub mod io;

pub use buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use io::{
    export_audio, generate_sine_sweep, generate_test_tone, import_audio, is_wav_path,
    ExportFormat,
};

//! Error type shared by every layer of AuralMind
//!
//! Variants map to stable codes for reports. `is_recoverable` tells the job
//! layer which failures may bypass a stage instead of failing the job.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MasterError>;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("no such file: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("unreadable audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("audio has no frames")]
    EmptyAudio,


    #[error("parameter '{param}' out of range: {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Unknown preset '{name}'")]
    UnknownPreset { name: String },


    #[error("mastering failed: {reason}")]
    ProcessingError { reason: String },

    #[error("cancelled before '{stage}'")]
    Cancelled { stage: String },

    #[error("stage '{stage}' produced non-finite samples")]
    DspOverflow { stage: String },

    #[error("spectrum cache entry unusable: {reason}")]
    CacheCorrupted { reason: String },

    #[error("stem separator failed: {reason}")]
    StemSeparation { reason: String },


    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MasterError {
    /// Stable identifier written into reports
    pub fn error_code(&self) -> &'static str {
        match self {
            MasterError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MasterError::InvalidAudio { .. } => "INVALID_AUDIO",
            MasterError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MasterError::EmptyAudio => "EMPTY_AUDIO",
            MasterError::InvalidParameter { .. } => "INVALID_PARAMETER",
            MasterError::UnknownPreset { .. } => "UNKNOWN_PRESET",
            MasterError::ProcessingError { .. } => "PROCESSING_ERROR",
            MasterError::Cancelled { .. } => "CANCELLED",
            MasterError::DspOverflow { .. } => "DSP_OVERFLOW",
            MasterError::CacheCorrupted { .. } => "CACHE_CORRUPTED",
            MasterError::StemSeparation { .. } => "STEM_SEPARATION",
            MasterError::Io(_) => "IO_ERROR",
            MasterError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the pipeline may bypass the failing stage and carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MasterError::DspOverflow { .. }
                | MasterError::StemSeparation { .. }
                | MasterError::InvalidParameter { .. }
                | MasterError::UnknownPreset { .. }
        )
    }

    /// Hints printed next to the error by the CLI
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MasterError::FileNotFound { .. } => vec![
                "Double-check the --target / --reference path",
            ],
            MasterError::InvalidAudio { .. } => vec![
                "Re-export the source as PCM or float WAV",
            ],
            MasterError::UnsupportedFormat { .. } => vec![
                "Convert to 16/24-bit PCM or 32-bit float WAV",
                "Only mono and stereo sources are supported",
            ],
            MasterError::InvalidParameter { .. } => vec![
                "Check the preset or override value against its documented range",
            ],
            MasterError::UnknownPreset { .. } => vec![
                "Available presets: hi_fi_streaming, club, radio_loud",
                "Use --preset-file to load a custom preset",
            ],
            MasterError::DspOverflow { .. } => vec![
                "The stage settings may be too extreme",
                "Stage has been bypassed to prevent audio corruption",
            ],
            MasterError::CacheCorrupted { .. } => vec![
                "Clear the filter cache and resubmit the job",
            ],
            MasterError::StemSeparation { .. } => vec![
                "Processing continues on the mixed buffer",
                "Disable stem separation in the preset",
            ],
            _ => vec![],
        }
    }
}

//! WAV adapters
//!
//! Files come in at their native sample rate and leave at the rate of the
//! buffer handed to [`export_audio`]. Mono files are spread to stereo on read.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::{AudioBuffer, PCM16_MAX};
use crate::error::{MasterError, Result};

const PCM24_SCALE: f32 = 8_388_607.0;

/// Output sample encoding, chosen by bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// 16 and 24 write integer PCM, 32 writes IEEE float
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 16 }
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Self {
        ExportFormat { bit_depth }
    }

    fn wav_spec(&self, channels: u16, sample_rate: u32) -> Result<WavSpec> {
        let sample_format = match self.bit_depth {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => {
                return Err(MasterError::UnsupportedFormat {
                    format: format!("{}-bit output (16, 24 or 32 only)", other),
                })
            }
        };
        Ok(WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format,
        })
    }
}

/// True for a `.wav` extension in any case
pub fn is_wav_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("wav")
    )
}

/// Read a WAV file into a stereo float buffer
///
/// # Errors
/// * `FileNotFound` - nothing at `path`
/// * `InvalidAudio` - not a readable WAV stream
/// * `UnsupportedFormat` - more than two channels, or an odd integer width
/// * `EmptyAudio` - header only, no frames
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.is_file() {
        return Err(MasterError::FileNotFound {
            path: path.display().to_string(),
            source: None,
        });
    }

    let reader = WavReader::open(path).map_err(|e| MasterError::InvalidAudio {
        reason: format!("cannot parse {} as WAV: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;
    let spec = reader.spec();

    let frames = decode(reader, spec)?;
    let buffer = AudioBuffer::deinterleave(&frames, usize::from(spec.channels), spec.sample_rate)?;
    if buffer.is_empty() {
        return Err(MasterError::EmptyAudio);
    }

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        frames = buffer.len(),
        "imported audio"
    );
    Ok(buffer)
}

/// Write `buffer` as WAV
///
/// Integer output saturates at the largest code of its width so a
/// full-scale positive sample never wraps negative.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = format.wav_spec(buffer.channels() as u16, buffer.sample_rate)?;
    let mut writer = WavWriter::create(path, spec).map_err(into_io)?;

    for sample in buffer.interleave() {
        let written = match format.bit_depth {
            16 => writer.write_sample(pcm16(sample)),
            24 => writer.write_sample(pcm24(sample)),
            _ => writer.write_sample(sample),
        };
        written.map_err(into_io)?;
    }
    writer.finalize().map_err(into_io)?;

    tracing::debug!(path = %path.display(), bits = format.bit_depth, frames = buffer.len(), "exported audio");
    Ok(())
}

fn pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, PCM16_MAX) * 32768.0).round() as i16
}

fn pcm24(sample: f32) -> i32 {
    (sample * PCM24_SCALE).clamp(-PCM24_SCALE - 1.0, PCM24_SCALE) as i32
}

/// Constant-amplitude sine, identical on both sides
pub fn generate_test_tone(frequency: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> AudioBuffer {
    let frames = (seconds * sample_rate as f32) as usize;
    let omega = std::f64::consts::TAU * f64::from(frequency) / f64::from(sample_rate);
    let mono = (0..frames)
        .map(|n| amplitude * (omega * n as f64).sin() as f32)
        .collect();
    AudioBuffer::from_mono(mono, sample_rate)
}

/// Exponential sine sweep from `start_hz` to `end_hz`, identical on both sides
pub fn generate_sine_sweep(
    start_hz: f64,
    end_hz: f64,
    amplitude: f32,
    seconds: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let frames = (seconds * f64::from(sample_rate)) as usize;
    let rate = (end_hz / start_hz).ln();
    let scale = std::f64::consts::TAU * start_hz * seconds / rate;

    let mono = (0..frames)
        .map(|n| {
            let t = n as f64 / f64::from(sample_rate);
            let phase = scale * ((rate * t / seconds).exp() - 1.0);
            amplitude * phase.sin() as f32
        })
        .collect();
    AudioBuffer::from_mono(mono, sample_rate)
}

fn into_io(e: hound::Error) -> MasterError {
    match e {
        hound::Error::IoError(io) => MasterError::Io(io),
        other => MasterError::Io(std::io::Error::other(other.to_string())),
    }
}

/// Interleaved samples normalised to [-1, 1)
fn decode<R: std::io::Read>(mut reader: WavReader<R>, spec: WavSpec) -> Result<Vec<f32>> {
    let unreadable = |e: hound::Error| MasterError::InvalidAudio {
        reason: format!("truncated or corrupt {}-bit sample data: {}", spec.bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    if spec.sample_format == SampleFormat::Float {
        return reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(unreadable);
    }

    if !matches!(spec.bits_per_sample, 8 | 16 | 24 | 32) {
        return Err(MasterError::UnsupportedFormat {
            format: format!("{}-bit integer audio", spec.bits_per_sample),
        });
    }
    let full_scale = 2f64.powi(i32::from(spec.bits_per_sample) - 1);
    reader
        .samples::<i32>()
        .map(|s| s.map(|code| (f64::from(code) / full_scale) as f32))
        .collect::<std::result::Result<_, _>>()
        .map_err(unreadable)
}

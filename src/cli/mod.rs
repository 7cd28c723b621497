//! CLI Module
//!
//! Command-line front end for the AuralMind mastering engine.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::preset::PresetOverrides;

/// AuralMind - offline reference-matching mastering
#[derive(Parser, Debug)]
#[command(name = "auralmind-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Master one file and write report.json next to it
    #[command(name = "master")]
    Master(MasterArgs),

    /// Master every WAV file under a directory
    #[command(name = "batch")]
    Batch(BatchArgs),

    /// Print the named presets as JSON
    #[command(name = "presets")]
    Presets,
}

/// Preset selection shared by `master` and `batch`
#[derive(Args, Debug, Clone)]
pub struct PresetArgs {
    /// Named preset
    #[arg(long, default_value = "hi_fi_streaming")]
    pub preset: String,

    /// Load the preset from a JSON file instead
    #[arg(long)]
    pub preset_file: Option<PathBuf>,

    /// Loudness target override (LUFS)
    #[arg(long, allow_hyphen_values = true)]
    pub target_lufs: Option<f64>,

    /// True-peak ceiling override (dBTP)
    #[arg(long, allow_hyphen_values = true)]
    pub true_peak_ceiling: Option<f64>,

    /// FIR length override
    #[arg(long)]
    pub fir_taps: Option<usize>,

    #[arg(long)]
    pub enable_mono_sub: bool,

    #[arg(long)]
    pub enable_spatial_widen: bool,

    #[arg(long)]
    pub enable_micro_shift: bool,

    #[arg(long)]
    pub enable_micro_detail: bool,

    #[arg(long)]
    pub enable_masking_dip: bool,

    #[arg(long)]
    pub enable_de_ess: bool,

    #[arg(long)]
    pub enable_harmonics: bool,

    #[arg(long)]
    pub enable_transient_shaper: bool,

    #[arg(long)]
    pub enable_section_lift: bool,

    /// Use stem separation when a separator is available
    #[arg(long)]
    pub enable_stems: bool,

    /// Skip the curve EQ
    #[arg(long)]
    pub disable_eq: bool,

    /// Skip the soft clipper ahead of the limiter
    #[arg(long)]
    pub disable_soft_clip: bool,
}

impl PresetArgs {
    /// Flags and values given on the command line; absent flags keep the
    /// preset's setting
    pub fn overrides(&self) -> PresetOverrides {
        let on = |flag: bool| flag.then_some(true);
        let off = |flag: bool| flag.then_some(false);
        PresetOverrides {
            target_lufs: self.target_lufs,
            true_peak_ceiling_db: self.true_peak_ceiling,
            fir_taps: self.fir_taps,
            eq: off(self.disable_eq),
            soft_clip: off(self.disable_soft_clip),
            use_stems: on(self.enable_stems),
            mono_sub: on(self.enable_mono_sub),
            spatial_widen: on(self.enable_spatial_widen),
            micro_shift: on(self.enable_micro_shift),
            micro_detail: on(self.enable_micro_detail),
            masking_dip: on(self.enable_masking_dip),
            de_ess: on(self.enable_de_ess),
            harmonics: on(self.enable_harmonics),
            transient_shaper: on(self.enable_transient_shaper),
            section_lift: on(self.enable_section_lift),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MasterArgs {
    /// Audio to master
    #[arg(long)]
    pub target: PathBuf,

    /// Reference recording to match
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Output WAV path
    #[arg(long)]
    pub out: PathBuf,

    /// Output bit depth: 16, 24 or 32 (float)
    #[arg(long, default_value_t = 16)]
    pub bit_depth: u16,

    #[command(flatten)]
    pub preset: PresetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory searched recursively for .wav files
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Directory receiving the mastered files and their reports
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Reference recording applied to every file
    #[arg(long)]
    pub reference: Option<PathBuf>,

    #[arg(long, default_value_t = 16)]
    pub bit_depth: u16,

    #[command(flatten)]
    pub preset: PresetArgs,
}

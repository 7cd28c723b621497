//! CLI Command Implementations
//!
//! File handling around the mastering engine: import, master, export and
//! the JSON report written next to every output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::cli::{BatchArgs, MasterArgs, PresetArgs};
use crate::convolve::SpectrumCache;
use crate::diagnostics::StageDiagnostics;
use crate::engine::{export_audio, import_audio, is_wav_path, AudioBuffer, ExportFormat};
use crate::error::MasterError;
use crate::measure::ProgramMetrics;
use crate::pipeline::{CancellationToken, MasteringEngine, MasteringJob};
use crate::preset::Preset;

/// Report file name used by `master`
pub const REPORT_FILE: &str = "report.json";

const COPY_WARNING: &str = "Non-WAV input detected; DSP modules skipped and file copied unchanged.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPair {
    pub before: ProgramMetrics,
    pub after: ProgramMetrics,
}

/// The JSON report written next to a mastered file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub status: String,
    pub preset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub generated_at: String,
    pub target: String,
    pub reference: Option<String>,
    pub output: String,
    pub modules: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<StageDiagnostics>,
}

impl Report {
    fn new(preset: &Preset, target: &Path, reference: Option<&Path>, output: &Path) -> Self {
        Self {
            status: "ok".to_string(),
            preset: preset.name.clone(),
            job_id: None,
            generated_at: Utc::now().to_rfc3339(),
            target: target.display().to_string(),
            reference: reference.map(|p| p.display().to_string()),
            output: output.display().to_string(),
            modules: preset
                .enabled_modules()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            warning: None,
            metrics: None,
            sample_rate: None,
            diagnostics: None,
        }
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

/// Resolve the preset from a file or a name, then apply the flags
pub fn resolve_preset(args: &PresetArgs) -> anyhow::Result<Preset> {
    let base = match &args.preset_file {
        Some(path) => Preset::from_json_file(path)
            .with_context(|| format!("loading preset file {}", path.display()))?,
        None => Preset::named(&args.preset)?,
    };
    Ok(base.with_overrides(&args.overrides())?)
}

/// Master one file with a shared engine, writing the output and its report
#[allow(clippy::too_many_arguments)]
pub fn master_file(
    engine: &MasteringEngine,
    preset: &Preset,
    target: &Path,
    reference: Option<&AudioBuffer>,
    reference_path: Option<&Path>,
    out: &Path,
    report_path: &Path,
    format: ExportFormat,
) -> anyhow::Result<Report> {
    if !target.exists() {
        bail!("target file not found: {}", target.display());
    }
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let mut report = Report::new(preset, target, reference_path, out);

    if !is_wav_path(target) {
        warn!("{} is not a WAV file, copying unchanged", target.display());
        std::fs::copy(target, out)
            .with_context(|| format!("copying {} to {}", target.display(), out.display()))?;
        report.warning = Some(COPY_WARNING.to_string());
        report.write(report_path)?;
        return Ok(report);
    }

    let audio = import_audio(target).with_context(|| format!("reading {}", target.display()))?;
    let mut job = MasteringJob::new(audio, preset.clone());
    if let Some(reference) = reference {
        job = job.with_reference(reference.clone());
    }

    info!("Mastering {} (job {})", target.display(), job.id);
    let output = engine.master(&job, &CancellationToken::new())?;
    export_audio(&output.buffer, out, format).with_context(|| format!("writing {}", out.display()))?;

    let diagnostics = output.diagnostics;
    for stage in diagnostics.bypassed_stages() {
        warn!("Stage {} was bypassed", stage);
    }
    report.job_id = Some(diagnostics.job_id);
    report.metrics = Some(MetricsPair {
        before: diagnostics.before.rounded(),
        after: diagnostics.after.rounded(),
    });
    report.sample_rate = Some(diagnostics.sample_rate);
    report.diagnostics = Some(diagnostics);
    report.write(report_path)?;

    Ok(report)
}

/// Suggestions attached to the engine error behind `err`, if any
pub fn recovery_hints(err: &anyhow::Error) -> Vec<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MasterError>())
        .map(MasterError::recovery_suggestions)
        .unwrap_or_default()
}

fn log_failure(subject: &Path, err: &anyhow::Error) {
    warn!("{}: {:#}", subject.display(), err);
    for hint in recovery_hints(err) {
        warn!("  hint: {}", hint);
    }
}

fn load_reference(path: Option<&Path>) -> anyhow::Result<Option<AudioBuffer>> {
    path.map(|p| import_audio(p).with_context(|| format!("reading reference {}", p.display())))
        .transpose()
}

/// `master` command
pub fn master(args: &MasterArgs) -> anyhow::Result<Report> {
    let preset = resolve_preset(&args.preset)?;
    let reference = load_reference(args.reference.as_deref())?;
    let report_path = args
        .out
        .parent()
        .map(|dir| dir.join(REPORT_FILE))
        .unwrap_or_else(|| PathBuf::from(REPORT_FILE));

    let engine = MasteringEngine::new(Arc::new(SpectrumCache::default()));
    let report = master_file(
        &engine,
        &preset,
        &args.target,
        reference.as_ref(),
        args.reference.as_deref(),
        &args.out,
        &report_path,
        ExportFormat::new(args.bit_depth),
    )
    .inspect_err(|err| log_failure(&args.target, err))?;

    println!("Mastering complete: {}", args.out.display());
    if let Some(metrics) = &report.metrics {
        println!(
            "  Loudness: {:.2} -> {:.2} LUFS, true peak {:.2} dBTP",
            metrics.before.estimated_lufs, metrics.after.estimated_lufs, metrics.after.true_peak_dbtp
        );
    }
    println!("  Report: {}", report_path.display());
    Ok(report)
}

/// `batch` command: every .wav under the input directory, in parallel
///
/// Outputs mirror the input tree; each file gets `<name>.report.json`.
pub fn batch(args: &BatchArgs) -> anyhow::Result<()> {
    let preset = resolve_preset(&args.preset)?;
    let reference = load_reference(args.reference.as_deref())?;

    let inputs: Vec<PathBuf> = WalkDir::new(&args.input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_wav_path(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    if inputs.is_empty() {
        warn!("No WAV files found under {}", args.input_dir.display());
        return Ok(());
    }
    info!("Mastering {} files with preset {}", inputs.len(), preset.name);

    let engine = MasteringEngine::new(Arc::new(SpectrumCache::default()));
    let format = ExportFormat::new(args.bit_depth);

    let failures: Vec<(PathBuf, anyhow::Error)> = inputs
        .par_iter()
        .filter_map(|input| {
            let relative = input.strip_prefix(&args.input_dir).unwrap_or(input);
            let out = args.out_dir.join(relative);
            let report_path = out.with_extension("report.json");
            master_file(
                &engine,
                &preset,
                input,
                reference.as_ref(),
                args.reference.as_deref(),
                &out,
                &report_path,
                format,
            )
            .err()
            .map(|e| (input.clone(), e))
        })
        .collect();

    let stats = engine.cache().stats();
    println!(
        "Batch complete: {} mastered, {} failed (filter cache {} hits / {} misses)",
        inputs.len() - failures.len(),
        failures.len(),
        stats.hits,
        stats.misses
    );
    for (path, err) in &failures {
        log_failure(path, err);
    }
    if !failures.is_empty() {
        bail!("{} of {} files failed", failures.len(), inputs.len());
    }
    Ok(())
}

/// `presets` command
pub fn list_presets() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&Preset::all())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::engine::generate_sine_sweep;
    use clap::Parser;

    fn master_args(dir: &Path, target: &Path, extra: &[&str]) -> MasterArgs {
        let out = dir.join("out").join("master.wav");
        let mut argv = vec![
            "auralmind-cli".to_string(),
            "master".to_string(),
            "--target".to_string(),
            target.display().to_string(),
            "--out".to_string(),
            out.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Master(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_master_writes_output_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("song.wav");
        let sweep = generate_sine_sweep(40.0, 16000.0, 0.5, 2.0, 48000);
        export_audio(&sweep, &target, ExportFormat::new(24)).unwrap();

        let args = master_args(dir.path(), &target, &["--enable-mono-sub"]);
        let report = master(&args).unwrap();

        assert!(args.out.exists());
        let text = std::fs::read_to_string(dir.path().join("out").join(REPORT_FILE)).unwrap();
        let parsed: Report = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.status, "ok");
        assert_eq!(parsed.preset, "hi_fi_streaming");
        assert_eq!(parsed.modules["mono_sub"], true);
        assert_eq!(parsed.sample_rate, Some(48000));
        assert_eq!(parsed.job_id, report.job_id);
        assert!(parsed.warning.is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&parsed.generated_at).is_ok());

        let mastered = import_audio(&args.out).unwrap();
        assert_eq!(mastered.len(), sweep.len());
    }

    #[test]
    fn test_non_wav_target_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("song.mp3");
        std::fs::write(&target, b"not really audio").unwrap();

        let args = master_args(dir.path(), &target, &[]);
        let report = master(&args).unwrap();

        assert_eq!(std::fs::read(&args.out).unwrap(), b"not really audio");
        assert!(report.warning.is_some());
        assert!(report.metrics.is_none());
    }

    #[test]
    fn test_missing_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = master_args(dir.path(), &dir.path().join("missing.wav"), &[]);
        assert!(master(&args).is_err());
    }

    #[test]
    fn test_recovery_hints_follow_engine_errors() {
        let err = anyhow::Error::new(MasterError::UnknownPreset { name: "nope".into() })
            .context("resolving preset");
        assert!(recovery_hints(&err).iter().any(|h| h.contains("hi_fi_streaming")));

        let plain = anyhow::anyhow!("disk full");
        assert!(recovery_hints(&plain).is_empty());
    }

    #[test]
    fn test_unknown_preset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("song.wav");
        let args = master_args(dir.path(), &target, &["--preset", "nope"]);
        let err = master(&args).unwrap_err();
        assert!(err.to_string().contains("Unknown preset"));
    }

    #[test]
    fn test_batch_masters_tree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(input.join("album")).unwrap();
        let tone = generate_sine_sweep(60.0, 8000.0, 0.4, 1.0, 44100);
        export_audio(&tone, &input.join("a.wav"), ExportFormat::default()).unwrap();
        export_audio(&tone, &input.join("album").join("b.wav"), ExportFormat::default()).unwrap();
        std::fs::write(input.join("notes.txt"), "skip me").unwrap();

        let out = dir.path().join("out");
        let cli = Cli::parse_from([
            "auralmind-cli".to_string(),
            "batch".to_string(),
            "--input-dir".to_string(),
            input.display().to_string(),
            "--out-dir".to_string(),
            out.display().to_string(),
        ]);
        let Commands::Batch(args) = cli.command else {
            unreachable!()
        };
        batch(&args).unwrap();

        assert!(out.join("a.wav").exists());
        assert!(out.join("a.report.json").exists());
        assert!(out.join("album").join("b.wav").exists());
        assert!(!out.join("notes.txt").exists());
    }
}

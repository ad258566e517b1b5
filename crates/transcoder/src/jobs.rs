//! Job data model for a batch run.
//!
//! Everything here is transient: options and inputs are snapshotted when a
//! batch starts and results live only until the summary is handed back.

use crate::config::{Config, OutputFormat, QualityTier, ScaleAlgorithm, ScaleFactor};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier attached to every event a job produces.
pub type JobId = Uuid;

/// Options chosen by the user for one batch.
///
/// `scale_factor` and `scale_algorithm` are ignored while `scale_enabled` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    pub output_directory: PathBuf,
    pub output_format: OutputFormat,
    pub quality_tier: QualityTier,
    pub scale_enabled: bool,
    pub scale_factor: ScaleFactor,
    pub scale_algorithm: ScaleAlgorithm,
}

impl JobOptions {
    /// Build options from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_directory: config.output.directory.clone(),
            output_format: config.output.format,
            quality_tier: config.output.quality,
            scale_enabled: config.scale.enabled,
            scale_factor: config.scale.factor,
            scale_algorithm: config.scale.algorithm,
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Final classification of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Encoder exited with status 0.
    Success,
    /// Encoder exited with a nonzero status.
    EncoderFailure { exit_code: i32 },
    /// Access violation while a scale filter was active; almost always memory pressure.
    EncoderCrash { exit_code: i32 },
    /// The encoder could not be started.
    EncoderMissing { reason: String },
    /// The source could not be inspected when its job came up.
    ProbeError { reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    /// Remediation hint shown alongside the failure, if there is one.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            JobOutcome::EncoderCrash { .. } => Some(
                "the encoder ran out of memory while upscaling; try a lower scale factor or disable scaling",
            ),
            JobOutcome::EncoderMissing { .. } => {
                Some("install ffmpeg or place it next to the application")
            }
            _ => None,
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Success => write!(f, "success"),
            JobOutcome::EncoderFailure { exit_code } => {
                write!(f, "encoder failed with exit code {}", exit_code)
            }
            JobOutcome::EncoderCrash { exit_code } => {
                write!(f, "encoder crashed (exit code {:#x})", *exit_code as u32)
            }
            JobOutcome::EncoderMissing { reason } => write!(f, "encoder could not start: {}", reason),
            JobOutcome::ProbeError { reason } => write!(f, "source unreadable: {}", reason),
        }
    }
}

/// Result of running one input through the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub outcome: JobOutcome,
}

/// Aggregate outcome of a batch, results in queue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_count: usize,
    pub success_count: usize,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn from_results(total_count: usize, results: Vec<JobResult>) -> Self {
        let success_count = results.iter().filter(|r| r.outcome.is_success()).count();
        Self {
            total_count,
            success_count,
            results,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.total_count - self.success_count
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count == self.total_count
    }
}

/// Render a scale factor the way it appears in file names and filter expressions.
///
/// Whole numbers drop the fraction (`2`), others keep at most two decimals (`1.5`).
pub fn format_scale_factor(factor: f64) -> String {
    let fixed = format!("{:.2}", factor);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Output file name: `{stem}[_SR{scale}x]_fixed.{ext}`.
pub fn output_file_name(input: &Path, format: OutputFormat, scale: Option<f64>) -> OsString {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));

    if let Some(factor) = scale {
        name.push(format!("_SR{}x", format_scale_factor(factor)));
    }
    name.push("_fixed.");
    name.push(format.extension());
    name
}

/// Full output path for `input` inside `output_dir`.
pub fn output_path_for(
    output_dir: &Path,
    input: &Path,
    format: OutputFormat,
    scale: Option<f64>,
) -> PathBuf {
    output_dir.join(output_file_name(input, format, scale))
}

/// FIFO list of distinct input paths, as collected by the UI before a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputQueue {
    files: Vec<PathBuf>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path` unless an identical path is already queued.
    ///
    /// Returns true if the path was added.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    /// Append several paths, returning how many were new.
    pub fn add_all<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            if self.add(path) {
                added += 1;
            }
        }
        added
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copy of the current list, handed to the orchestrator at batch start.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.files.clone()
    }
}

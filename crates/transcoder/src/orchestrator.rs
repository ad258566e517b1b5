//! Batch orchestration: preconditions, the sequential job loop and reporting.
//!
//! A batch runs as one background task. Files are encoded strictly one at a
//! time; the scale filter is memory hungry and running encoders side by side
//! would multiply its footprint.

use crate::config::Config;
use crate::encode::{self, EncoderInvocation, ScaleClamp, Translator};
use crate::events::{BatchEvent, EventSink, WarningKind};
use crate::jobs::{
    format_scale_factor, output_path_for, BatchSummary, JobId, JobOptions, JobOutcome, JobResult,
};
use crate::locator::{LocateError, ToolLocator};
use crate::probe::{probe_dimensions, Dimensions, ProbeError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Batch-level failures. Any of these stops the batch before a job starts.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no input files queued")]
    EmptyQueue,

    #[error("encoder unavailable: {0}")]
    EncoderMissing(#[from] LocateError),

    #[error("failed to create output directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a batch is already running")]
    AlreadyRunning,
}

/// Immutable snapshot of the input list and options taken at start.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub files: Vec<PathBuf>,
    pub options: JobOptions,
}

impl BatchRequest {
    pub fn new(files: Vec<PathBuf>, options: JobOptions) -> Self {
        Self { files, options }
    }
}

/// Scale factor in effect for the remaining files of a batch.
///
/// Once a source forces the factor down, later files keep the lowered value.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaleState {
    factor: f64,
}

impl ScaleState {
    fn new(options: &JobOptions) -> Self {
        Self {
            factor: options.scale_factor.as_f64(),
        }
    }

    /// Adopt a clamp unless it rules out upscaling for that source entirely.
    fn absorb(&mut self, clamp: &ScaleClamp) {
        if !clamp.disables_upscale() {
            self.factor = clamp.clamped;
        }
    }
}

/// Marks the orchestrator idle and emits `BatchEnded` however the run exits.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    sink: &'a dyn EventSink,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.sink.emit(BatchEvent::BatchEnded);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Drives batches of encoder jobs.
#[derive(Debug)]
pub struct Orchestrator {
    locator: ToolLocator,
    encoder_name: String,
    probe_name: String,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        locator: ToolLocator,
        encoder_name: impl Into<String>,
        probe_name: impl Into<String>,
    ) -> Self {
        Self {
            locator,
            encoder_name: encoder_name.into(),
            probe_name: probe_name.into(),
            running: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ToolLocator::from_config(&config.tools),
            config.tools.encoder_name.clone(),
            config.tools.probe_name.clone(),
        )
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    /// Locate the encoder (cached).
    pub fn locate_encoder(&self) -> Result<PathBuf, LocateError> {
        self.locator.locate(&self.encoder_name)
    }

    /// Search for the encoder and probe again, ignoring cached results.
    pub fn recheck_tools(&self) -> Result<PathBuf, LocateError> {
        let _ = self.locator.recheck(&self.probe_name);
        self.locator.recheck(&self.encoder_name)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `request` as a background task.
    pub fn spawn_batch(
        self: &Arc<Self>,
        request: BatchRequest,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<Result<BatchSummary, BatchError>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run_batch(request, sink.as_ref()).await })
    }

    /// Run every file in `request` through the encoder, one at a time.
    ///
    /// Precondition failures (empty queue, missing encoder, output directory
    /// creation) abort before any process is spawned. Per-file failures are
    /// recorded in the summary and the batch moves on.
    pub async fn run_batch(
        &self,
        request: BatchRequest,
        sink: &dyn EventSink,
    ) -> Result<BatchSummary, BatchError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("rejected batch start while another batch is running");
            return Err(BatchError::AlreadyRunning);
        }

        let BatchRequest { files, options } = request;
        let total = files.len();
        sink.emit(BatchEvent::BatchStarted { total });
        let _guard = RunGuard {
            running: &self.running,
            sink,
        };

        let encoder = match self.check_preconditions(&files, &options) {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!(error = %e, "batch aborted");
                sink.emit(BatchEvent::Aborted {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        tracing::info!(
            total,
            encoder = %encoder.display(),
            output_dir = %options.output_directory.display(),
            "starting batch"
        );

        let mut scale = ScaleState::new(&options);
        let mut results = Vec::with_capacity(total);

        for (index, input) in files.iter().enumerate() {
            let name = display_name(input);
            sink.emit(BatchEvent::progress(index, total, Some(name.clone())));

            let result = self
                .run_job(&encoder, input, &options, &mut scale, sink)
                .await;
            self.report_outcome(&name, &result, sink);
            results.push(result);
        }

        sink.emit(BatchEvent::progress(total, total, None));
        let summary = BatchSummary::from_results(total, results);
        tracing::info!(
            succeeded = summary.success_count,
            total = summary.total_count,
            "batch complete"
        );
        sink.emit(BatchEvent::Complete {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    fn check_preconditions(
        &self,
        files: &[PathBuf],
        options: &JobOptions,
    ) -> Result<PathBuf, BatchError> {
        if files.is_empty() {
            return Err(BatchError::EmptyQueue);
        }

        let encoder = self.locate_encoder()?;

        std::fs::create_dir_all(&options.output_directory).map_err(|source| {
            BatchError::DirectoryCreation {
                path: options.output_directory.clone(),
                source,
            }
        })?;

        Ok(encoder)
    }

    async fn run_job(
        &self,
        encoder: &Path,
        input: &Path,
        options: &JobOptions,
        scale: &mut ScaleState,
        sink: &dyn EventSink,
    ) -> JobResult {
        let job_id = Uuid::new_v4();
        // Named from the factor in effect as the file starts, before this
        // file's own probe or clamp. A clamp here shows up in later names only.
        let output = output_path_for(
            &options.output_directory,
            input,
            options.output_format,
            options.scale_enabled.then_some(scale.factor),
        );

        if let Err(e) = std::fs::metadata(input) {
            return JobResult {
                job_id,
                input_path: input.to_path_buf(),
                output_path: output,
                outcome: JobOutcome::ProbeError {
                    reason: e.to_string(),
                },
            };
        }

        let probe = if options.scale_enabled {
            self.probe_source(job_id, input, sink).await
        } else {
            None
        };

        let translation = Translator::new(options)
            .with_scale_factor(scale.factor)
            .translate(input, &output, probe);

        if let Some(clamp) = &translation.clamp {
            self.report_clamp(job_id, clamp, sink);
            scale.absorb(clamp);
        }

        let invocation = EncoderInvocation::new(
            job_id,
            encoder.to_path_buf(),
            translation,
            input.to_path_buf(),
            output,
        );

        tracing::info!(
            job_id = %job_id,
            input = %input.display(),
            output = %invocation.output_path.display(),
            scaling = invocation.scaling,
            "starting job"
        );
        sink.emit(BatchEvent::LogLine {
            job_id,
            text: format!("Running: {}", invocation.command_line()),
        });

        encode::run(&invocation, sink).await
    }

    /// Probe source dimensions; failures are reported and yield `None`.
    async fn probe_source(
        &self,
        job_id: JobId,
        input: &Path,
        sink: &dyn EventSink,
    ) -> Option<Dimensions> {
        let result = match self.locator.locate(&self.probe_name) {
            Ok(probe_tool) => probe_dimensions(&probe_tool, input).await,
            Err(e) => Err(ProbeError::Unavailable(e.to_string())),
        };

        match result {
            Ok(dims) => {
                tracing::debug!(job_id = %job_id, %dims, "probed source");
                Some(dims)
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "probe failed; encoding without scaling");
                sink.emit(BatchEvent::warning(
                    Some(job_id),
                    WarningKind::ProbeFailed,
                    format!(
                        "Could not read the resolution of {} ({}); converting without upscaling",
                        display_name(input),
                        e
                    ),
                ));
                None
            }
        }
    }

    fn report_clamp(&self, job_id: JobId, clamp: &ScaleClamp, sink: &dyn EventSink) {
        let original = format_scale_factor(clamp.original);
        let clamped = format_scale_factor(clamp.clamped);
        let text = if clamp.disables_upscale() {
            format!(
                "Source is {} and cannot be upscaled within 3840x2160; converting at original size",
                clamp.source
            )
        } else {
            format!(
                "Scale {}x is too large for a {} source; using {}x to limit memory use",
                original, clamp.source, clamped
            )
        };
        tracing::warn!(
            job_id = %job_id,
            source = %clamp.source,
            original = clamp.original,
            clamped = clamp.clamped,
            "scale factor clamped"
        );
        sink.emit(BatchEvent::warning(
            Some(job_id),
            WarningKind::ScaleClamped {
                original: clamp.original,
                clamped: clamp.clamped,
            },
            text,
        ));
    }

    fn report_outcome(&self, name: &str, result: &JobResult, sink: &dyn EventSink) {
        let job_id = result.job_id;
        match &result.outcome {
            JobOutcome::Success => {
                tracing::info!(job_id = %job_id, file = name, "job succeeded");
                sink.emit(BatchEvent::LogLine {
                    job_id,
                    text: format!("Converted: {}", name),
                });
            }
            outcome => {
                tracing::warn!(job_id = %job_id, file = name, %outcome, "job failed");
                sink.emit(BatchEvent::LogLine {
                    job_id,
                    text: format!("Failed: {} ({})", name, outcome),
                });
                if let Some(guidance) = outcome.guidance() {
                    let kind = match outcome {
                        JobOutcome::EncoderCrash { .. } => WarningKind::EncoderCrashed,
                        _ => WarningKind::General,
                    };
                    sink.emit(BatchEvent::warning(Some(job_id), kind, guidance));
                }
            }
        }
    }
}

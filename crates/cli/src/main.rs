//! CLI entry point for greenfix
//!
//! Collects input paths and options, runs one batch in the background and
//! renders its event stream to the terminal.

use clap::Parser;
use greenfix::config::{OutputFormat, QualityTier, ScaleAlgorithm, ScaleFactor};
use greenfix::{
    expand_inputs, BatchEvent, BatchRequest, BatchSummary, ChannelSink, Config, InputQueue,
    JobOptions, Orchestrator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Repair and re-encode videos (for example green-tinted phone clips) with ffmpeg
#[derive(Parser, Debug)]
#[command(name = "greenfix")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video files or directories to convert
    inputs: Vec<PathBuf>,

    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory the repaired files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output container: mp4, mov, avi or mkv
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Quality tier: low, medium or high
    #[arg(short, long)]
    quality: Option<QualityTier>,

    /// Upscale by this factor (1.5, 2, 3 or 4); without a value uses 2
    #[arg(short, long, num_args = 0..=1, default_missing_value = "2")]
    scale: Option<ScaleFactor>,

    /// Disable upscaling even if the configuration enables it
    #[arg(long, conflicts_with = "scale")]
    no_scale: bool,

    /// Scaling algorithm: lanczos, bicubic, bilinear or nearest
    #[arg(short, long)]
    algorithm: Option<ScaleAlgorithm>,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Show encoder output and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Look for ffmpeg and ffprobe, report what was found and exit
    #[arg(long)]
    check_tools: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn job_options(config: &Config, args: &Args) -> JobOptions {
    let mut options = JobOptions::from_config(config);
    if let Some(dir) = &args.output_dir {
        options.output_directory = dir.clone();
    }
    if let Some(format) = args.format {
        options.output_format = format;
    }
    if let Some(quality) = args.quality {
        options.quality_tier = quality;
    }
    if let Some(factor) = args.scale {
        options.scale_enabled = true;
        options.scale_factor = factor;
    }
    if args.no_scale {
        options.scale_enabled = false;
    }
    if let Some(algorithm) = args.algorithm {
        options.scale_algorithm = algorithm;
    }
    options
}

fn check_tools(orchestrator: &Orchestrator, config: &Config) -> ExitCode {
    let locator = orchestrator.locator();
    match locator.bundle_dir() {
        Some(dir) => println!("bundle directory: {}", dir.display()),
        None => println!("bundle directory: none"),
    }
    let encoder = orchestrator.recheck_tools();
    match &encoder {
        Ok(path) => println!("{}: {}", config.tools.encoder_name, path.display()),
        Err(e) => println!("{}", e),
    }
    match locator.locate(&config.tools.probe_name) {
        Ok(path) => println!("{}: {}", config.tools.probe_name, path.display()),
        Err(e) => println!("{} (upscaling will run without resolution checks)", e),
    }
    if encoder.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Text rendering of one event. Returns `false` once the batch has ended.
fn render_text(event: &BatchEvent, verbose: bool) -> bool {
    match event {
        BatchEvent::BatchStarted { total } => println!("Converting {} file(s)", total),
        BatchEvent::Progress {
            completed,
            total,
            percent,
            current_file,
        } => match current_file {
            Some(name) => println!("[{}/{}] {:>3.0}% {}", completed + 1, total, percent, name),
            None => println!("[{}/{}] {:>3.0}%", completed, total, percent),
        },
        BatchEvent::Status { text, .. } => {
            if verbose {
                eprintln!("  {}", text);
            }
        }
        BatchEvent::LogLine { text, .. } => {
            if verbose {
                eprintln!("  {}", text);
            }
        }
        BatchEvent::Warning { text, .. } => eprintln!("warning: {}", text),
        BatchEvent::Aborted { reason } => eprintln!("error: {}", reason),
        BatchEvent::Complete { summary } => print_summary(summary),
        BatchEvent::BatchEnded => return false,
    }
    true
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "Done: {} of {} file(s) converted",
        summary.success_count, summary.total_count
    );
    for result in summary.results.iter().filter(|r| !r.outcome.is_success()) {
        println!("  failed: {} ({})", result.input_path.display(), result.outcome);
    }
    if let Some(first) = summary.results.iter().find(|r| r.outcome.is_success()) {
        if let Some(dir) = first.output_path.parent() {
            println!("Output: {}", dir.display());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = Arc::new(Orchestrator::from_config(&config));
    if args.check_tools {
        return check_tools(&orchestrator, &config);
    }

    let expanded = expand_inputs(&args.inputs);
    for rejected in &expanded.rejected {
        eprintln!("warning: skipping {} (not a video file)", rejected.display());
    }
    let mut queue = InputQueue::new();
    queue.add_all(expanded.accepted);
    tracing::debug!(queued = queue.len(), "collected input files");

    let request = BatchRequest::new(queue.snapshot(), job_options(&config, &args));
    tracing::debug!(?request, "batch request");

    let (sink, mut events) = ChannelSink::channel();
    let handle = orchestrator.spawn_batch(request, Arc::new(sink));

    while let Some(event) = events.recv().await {
        let more = if args.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
            !matches!(event, BatchEvent::BatchEnded)
        } else {
            render_text(&event, args.verbose)
        };
        if !more {
            break;
        }
    }

    match handle.await {
        Ok(Ok(summary)) if summary.all_succeeded() => ExitCode::SUCCESS,
        Ok(Ok(_)) | Ok(Err(_)) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Batch task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

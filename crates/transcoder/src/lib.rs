//! greenfix
//!
//! Batch repair and re-encode of video files through an external ffmpeg,
//! with optional upscaling bounded by a memory and resolution budget.

pub mod encode;
pub mod events;
pub mod jobs;
pub mod locator;
pub mod orchestrator;
pub mod probe;
pub mod scan;

pub use greenfix_config as config;
pub use greenfix_config::Config;
pub use encode::{
    classify_exit, clamp_scale, quality_params, translate, EncoderInvocation, ExitKind,
    QualityParams, ScaleClamp, Translation, Translator,
};
pub use events::{BatchEvent, ChannelSink, EventSink, RecordingSink, WarningKind};
pub use jobs::{
    output_file_name, output_path_for, BatchSummary, InputQueue, JobId, JobOptions, JobOutcome,
    JobResult,
};
pub use locator::{LocateError, ToolLocator};
pub use orchestrator::{BatchError, BatchRequest, Orchestrator};
pub use probe::{probe_dimensions, Dimensions, ProbeError};
pub use scan::{expand_inputs, is_video_file, ExpandedInputs};

//! Translation of user options into encoder arguments.
//!
//! The pixel format is always forced to 4:2:0. Phone recordings that play back
//! green carry a chroma layout most players mis-decode; re-encoding to yuv420p
//! is the repair.

use crate::jobs::{format_scale_factor, JobOptions};
use crate::probe::Dimensions;
use crate::config::{QualityTier, ScaleAlgorithm};
use std::ffi::OsString;
use std::path::Path;

pub const PIXEL_FORMAT: &str = "yuv420p";
pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";

/// Encoder threads while a scale filter is active, bounding peak memory.
pub const SCALED_THREAD_LIMIT: u32 = 4;
pub const MAX_MUXING_QUEUE_SIZE: u32 = 1024;

pub const MAX_TARGET_WIDTH: u32 = 3840;
pub const MAX_TARGET_HEIGHT: u32 = 2160;
/// Upper bound on a factor once clamping kicks in.
pub const MAX_CLAMPED_FACTOR: f64 = 2.0;

const BYTES_PER_PIXEL: f64 = 1.5;
const BUFFERED_FPS: f64 = 30.0;
const BUFFERED_SECONDS: f64 = 5.0;
/// 2 GiB
pub const MEMORY_BUDGET_BYTES: f64 = 2.0 * 1024.0 * 1024.0 * 1024.0;
/// Factors are rendered with two decimals in filters and file names.
const FACTOR_STEPS: f64 = 100.0;

/// Encoder preset, CRF and audio bitrate bundled under a quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityParams {
    pub preset: &'static str,
    pub crf: u8,
    pub audio_bitrate: &'static str,
}

pub fn quality_params(tier: QualityTier) -> QualityParams {
    match tier {
        QualityTier::High => QualityParams {
            preset: "slow",
            crf: 18,
            audio_bitrate: "192k",
        },
        QualityTier::Medium => QualityParams {
            preset: "medium",
            crf: 23,
            audio_bitrate: "128k",
        },
        QualityTier::Low => QualityParams {
            preset: "fast",
            crf: 28,
            audio_bitrate: "96k",
        },
    }
}

/// Rough bytes the scaler keeps in flight for a source at `factor`.
pub fn estimated_memory_bytes(source: Dimensions, factor: f64) -> f64 {
    let target_pixels = source.width as f64 * factor * source.height as f64 * factor;
    target_pixels * BYTES_PER_PIXEL * BUFFERED_FPS * BUFFERED_SECONDS
}

/// Record of a requested factor being lowered for a given source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleClamp {
    pub source: Dimensions,
    pub original: f64,
    pub clamped: f64,
}

impl ScaleClamp {
    /// True when the clamped factor no longer enlarges the picture.
    pub fn disables_upscale(&self) -> bool {
        self.clamped <= 1.0
    }
}

/// Apply the memory and 4K safety limits to `factor` for `source`.
///
/// Returns the factor to use and, if it differs from the request, the clamp record.
/// A clamped factor is rounded down to the rendered precision so the encoded
/// target never lands past the limits.
pub fn clamp_scale(source: Dimensions, factor: f64) -> (f64, Option<ScaleClamp>) {
    let target_width = source.width as f64 * factor;
    let target_height = source.height as f64 * factor;

    let over_budget = estimated_memory_bytes(source, factor) > MEMORY_BUDGET_BYTES
        || target_width > MAX_TARGET_WIDTH as f64
        || target_height > MAX_TARGET_HEIGHT as f64;
    if !over_budget {
        return (factor, None);
    }

    let limit = factor
        .min(MAX_TARGET_WIDTH as f64 / source.width as f64)
        .min(MAX_TARGET_HEIGHT as f64 / source.height as f64)
        .min(MAX_CLAMPED_FACTOR);
    let clamped = (limit * FACTOR_STEPS).floor() / FACTOR_STEPS;

    if (clamped - factor).abs() < f64::EPSILON {
        return (factor, None);
    }

    (
        clamped,
        Some(ScaleClamp {
            source,
            original: factor,
            clamped,
        }),
    )
}

/// Single scale filter expression for the given factor and kernel.
pub fn scale_filter(factor: f64, algorithm: ScaleAlgorithm) -> String {
    let f = format_scale_factor(factor);
    format!("scale=iw*{f}:ih*{f}:flags={}", algorithm.as_flag())
}

/// Output of a translation: the argument vector plus what happened to scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub args: Vec<OsString>,
    /// Factor actually applied, `None` when the job runs unscaled.
    pub applied_scale: Option<f64>,
    pub clamp: Option<ScaleClamp>,
}

impl Translation {
    pub fn is_scaling(&self) -> bool {
        self.applied_scale.is_some()
    }
}

/// Builds encoder arguments from a set of options.
///
/// The scale factor defaults to the one in the options but can be replaced by
/// an already-clamped value carried over from earlier jobs in the batch.
#[derive(Debug, Clone)]
pub struct Translator<'a> {
    options: &'a JobOptions,
    scale_factor: f64,
}

impl<'a> Translator<'a> {
    pub fn new(options: &'a JobOptions) -> Self {
        Self {
            options,
            scale_factor: options.scale_factor.as_f64(),
        }
    }

    pub fn with_scale_factor(mut self, factor: f64) -> Self {
        self.scale_factor = factor;
        self
    }

    /// Build the argument vector for one job.
    ///
    /// Scaling happens only when it is enabled and the source was probed; a
    /// missing probe yields an unscaled invocation.
    pub fn translate(&self, input: &Path, output: &Path, probe: Option<Dimensions>) -> Translation {
        let mut args: Vec<OsString> = Vec::with_capacity(24);

        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args.push("-pix_fmt".into());
        args.push(PIXEL_FORMAT.into());

        let mut applied_scale = None;
        let mut clamp = None;
        if let (true, Some(source)) = (self.options.scale_enabled, probe) {
            let (factor, clamped) = clamp_scale(source, self.scale_factor);
            clamp = clamped;
            if factor > 1.0 {
                args.push("-max_muxing_queue_size".into());
                args.push(MAX_MUXING_QUEUE_SIZE.to_string().into());
                args.push("-threads".into());
                args.push(SCALED_THREAD_LIMIT.to_string().into());
                args.push("-filter_complex".into());
                args.push(scale_filter(factor, self.options.scale_algorithm).into());
                applied_scale = Some(factor);
            }
        }

        let quality = quality_params(self.options.quality_tier);
        args.push("-c:v".into());
        args.push(VIDEO_CODEC.into());
        args.push("-preset".into());
        args.push(quality.preset.into());
        args.push("-crf".into());
        args.push(quality.crf.to_string().into());
        args.push("-c:a".into());
        args.push(AUDIO_CODEC.into());
        args.push("-b:a".into());
        args.push(quality.audio_bitrate.into());

        args.push("-y".into());
        args.push(output.as_os_str().to_owned());

        Translation {
            args,
            applied_scale,
            clamp,
        }
    }
}

/// Translate with the factor stored in `options`.
pub fn translate(
    options: &JobOptions,
    input: &Path,
    output: &Path,
    probe: Option<Dimensions>,
) -> Translation {
    Translator::new(options).translate(input, output, probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, ScaleFactor};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn args_as_strings(translation: &Translation) -> Vec<String> {
        translation
            .args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    fn options(quality: QualityTier, scale: Option<ScaleFactor>) -> JobOptions {
        JobOptions {
            output_directory: PathBuf::from("/out"),
            output_format: OutputFormat::Mp4,
            quality_tier: quality,
            scale_enabled: scale.is_some(),
            scale_factor: scale.unwrap_or_default(),
            scale_algorithm: ScaleAlgorithm::Lanczos,
        }
    }

    #[test]
    fn test_high_quality_exact_arguments() {
        let opts = options(QualityTier::High, None);
        let translation = translate(&opts, Path::new("in.mov"), Path::new("/out/in_fixed.mp4"), None);

        assert_eq!(
            args_as_strings(&translation),
            vec![
                "-i", "in.mov", "-pix_fmt", "yuv420p", "-c:v", "libx264", "-preset", "slow",
                "-crf", "18", "-c:a", "aac", "-b:a", "192k", "-y", "/out/in_fixed.mp4",
            ]
        );
        assert!(!translation.is_scaling());
    }

    #[test]
    fn test_low_and_medium_quality_tuples() {
        let low = args_as_strings(&translate(
            &options(QualityTier::Low, None),
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            None,
        ));
        assert!(has_flag_with_value(&low, "-crf", "28"));
        assert!(has_flag_with_value(&low, "-preset", "fast"));
        assert!(has_flag_with_value(&low, "-b:a", "96k"));

        let medium = args_as_strings(&translate(
            &options(QualityTier::Medium, None),
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            None,
        ));
        assert!(has_flag_with_value(&medium, "-crf", "23"));
        assert!(has_flag_with_value(&medium, "-preset", "medium"));
        assert!(has_flag_with_value(&medium, "-b:a", "128k"));
    }

    #[test]
    fn test_scaling_adds_threads_and_filter() {
        let mut opts = options(QualityTier::High, Some(ScaleFactor::X2));
        opts.scale_algorithm = ScaleAlgorithm::Bicubic;
        let translation = translate(
            &opts,
            Path::new("in.mov"),
            Path::new("out.mp4"),
            Some(Dimensions::new(1280, 720)),
        );
        let args = args_as_strings(&translation);

        assert!(has_flag_with_value(&args, "-threads", "4"));
        assert!(has_flag_with_value(&args, "-max_muxing_queue_size", "1024"));
        assert!(has_flag_with_value(&args, "-filter_complex", "scale=iw*2:ih*2:flags=bicubic"));
        assert_eq!(translation.applied_scale, Some(2.0));
        assert_eq!(translation.clamp, None);

        // Filter sits between the pixel format and the codec settings.
        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        let pix_pos = args.iter().position(|a| a == "-pix_fmt").unwrap();
        let codec_pos = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(pix_pos < filter_pos && filter_pos < codec_pos);
        assert_eq!(args[args.len() - 2], "-y");
    }

    #[test]
    fn test_clamp_1080p_at_4x() {
        let (factor, clamp) = clamp_scale(Dimensions::new(1920, 1080), 4.0);
        assert_eq!(factor, 2.0);
        assert_eq!(
            clamp,
            Some(ScaleClamp {
                source: Dimensions::new(1920, 1080),
                original: 4.0,
                clamped: 2.0,
            })
        );

        let translation = translate(
            &options(QualityTier::High, Some(ScaleFactor::X4)),
            Path::new("in.mov"),
            Path::new("out.mp4"),
            Some(Dimensions::new(1920, 1080)),
        );
        let args = args_as_strings(&translation);
        assert!(has_flag_with_value(&args, "-filter_complex", "scale=iw*2:ih*2:flags=lanczos"));
        assert_eq!(translation.applied_scale, Some(2.0));
    }

    #[test]
    fn test_within_budget_is_not_clamped() {
        assert_eq!(clamp_scale(Dimensions::new(640, 360), 4.0), (4.0, None));
        assert_eq!(clamp_scale(Dimensions::new(1920, 1080), 2.0), (2.0, None));
    }

    #[test]
    fn test_clamp_bounded_by_height() {
        // 1440x1080 at 3x -> 4320x3240; height ratio 2160/1080 = 2.
        let (factor, clamp) = clamp_scale(Dimensions::new(1440, 1080), 3.0);
        assert_eq!(factor, 2.0);
        assert!(clamp.is_some());

        // 2880x1620 at 1.5x -> width ratio 3840/2880 wins, rounded down.
        let (factor, _) = clamp_scale(Dimensions::new(2880, 1620), 1.5);
        assert_eq!(format_scale_factor(factor), "1.33");
    }

    #[test]
    fn test_rendered_clamp_stays_within_4k() {
        // 3840/2890 = 1.3287...; rendering 1.33 would give 3843 px.
        let (factor, clamp) = clamp_scale(Dimensions::new(2890, 1626), 2.0);
        assert_eq!(clamp.map(|c| c.clamped), Some(factor));
        assert_eq!(
            scale_filter(factor, ScaleAlgorithm::Lanczos),
            "scale=iw*1.32:ih*1.32:flags=lanczos"
        );
        assert!(2890.0 * 1.32 <= MAX_TARGET_WIDTH as f64);
        assert!(1626.0 * 1.32 <= MAX_TARGET_HEIGHT as f64);
    }

    #[test]
    fn test_4k_source_cannot_upscale() {
        let opts = options(QualityTier::High, Some(ScaleFactor::X1_5));
        let translation = translate(
            &opts,
            Path::new("in.mov"),
            Path::new("out.mp4"),
            Some(Dimensions::new(3840, 2160)),
        );

        let clamp = translation.clamp.expect("4K source must be clamped");
        assert!(clamp.disables_upscale());
        assert!(!translation.is_scaling());
        assert!(!has_flag(&args_as_strings(&translation), "-filter_complex"));
    }

    #[test]
    fn test_missing_probe_means_no_filter() {
        let opts = options(QualityTier::High, Some(ScaleFactor::X2));
        let translation = translate(&opts, Path::new("in.mov"), Path::new("out.mp4"), None);
        let args = args_as_strings(&translation);

        assert!(!has_flag(&args, "-filter_complex"));
        assert!(!has_flag(&args, "-threads"));
        assert!(!translation.is_scaling());
    }

    #[test]
    fn test_scale_ignored_when_disabled() {
        let mut opts = options(QualityTier::High, None);
        opts.scale_factor = ScaleFactor::X4;
        let translation = translate(
            &opts,
            Path::new("in.mov"),
            Path::new("out.mp4"),
            Some(Dimensions::new(1920, 1080)),
        );
        assert!(!translation.is_scaling());
        assert_eq!(translation.clamp, None);
    }

    #[test]
    fn test_carried_over_factor_is_used() {
        let opts = options(QualityTier::High, Some(ScaleFactor::X4));
        let translation = Translator::new(&opts).with_scale_factor(2.0).translate(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            Some(Dimensions::new(640, 360)),
        );
        assert_eq!(translation.applied_scale, Some(2.0));
    }

    #[test]
    fn test_scale_filter_fractional_factor() {
        assert_eq!(
            scale_filter(1.5, ScaleAlgorithm::Nearest),
            "scale=iw*1.5:ih*1.5:flags=neighbor"
        );
    }

    fn dimensions_strategy() -> impl Strategy<Value = Dimensions> {
        (16u32..8192, 16u32..4608).prop_map(|(w, h)| Dimensions::new(w, h))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_translate_is_idempotent(
            quality in prop_oneof![Just(QualityTier::Low), Just(QualityTier::Medium), Just(QualityTier::High)],
            scale in prop::option::of(prop::sample::select(ScaleFactor::ALL.to_vec())),
            probe in prop::option::of(dimensions_strategy()),
            input in "[a-zA-Z0-9_/.-]{1,40}",
        ) {
            let opts = options(quality, scale);
            let first = translate(&opts, Path::new(&input), Path::new("/out/x.mp4"), probe);
            let second = translate(&opts, Path::new(&input), Path::new("/out/x.mp4"), probe);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_clamped_target_fits_limits(
            source in dimensions_strategy(),
            factor in prop::sample::select(ScaleFactor::ALL.to_vec()),
        ) {
            let (effective, clamp) = clamp_scale(source, factor.as_f64());
            prop_assert!(effective <= factor.as_f64());

            if let Some(clamp) = clamp {
                prop_assert!(clamp.clamped < clamp.original);
                prop_assert!(effective <= MAX_CLAMPED_FACTOR);
                prop_assert!(source.width as f64 * effective <= MAX_TARGET_WIDTH as f64 + 1e-6);
                prop_assert!(source.height as f64 * effective <= MAX_TARGET_HEIGHT as f64 + 1e-6);
            } else {
                prop_assert!(source.width as f64 * effective <= MAX_TARGET_WIDTH as f64);
                prop_assert!(source.height as f64 * effective <= MAX_TARGET_HEIGHT as f64);
            }

            // The factor the encoder actually sees is the rendered one.
            let rendered: f64 = format_scale_factor(effective).parse().unwrap();
            prop_assert!(source.width as f64 * rendered <= MAX_TARGET_WIDTH as f64 + 1e-6);
            prop_assert!(source.height as f64 * rendered <= MAX_TARGET_HEIGHT as f64 + 1e-6);
        }
    }
}

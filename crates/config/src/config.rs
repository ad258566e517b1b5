//! Core configuration structures and loading logic

use crate::options::{OutputFormat, QualityTier, ScaleAlgorithm, ScaleFactor};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Where and how repaired files are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Output directory, created on demand (default "converted_videos")
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub quality: QualityTier,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("converted_videos")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            format: OutputFormat::default(),
            quality: QualityTier::default(),
        }
    }
}

/// Optional resolution upscale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScaleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Ignored unless `enabled`
    #[serde(default)]
    pub factor: ScaleFactor,
    /// Ignored unless `enabled`
    #[serde(default)]
    pub algorithm: ScaleAlgorithm,
}

/// External tool lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Directory searched before PATH (defaults to the executable's directory)
    #[serde(default)]
    pub bundle_dir: Option<PathBuf>,
    #[serde(default = "default_encoder_name")]
    pub encoder_name: String,
    #[serde(default = "default_probe_name")]
    pub probe_name: String,
}

fn default_encoder_name() -> String {
    "ffmpeg".to_string()
}

fn default_probe_name() -> String {
    "ffprobe".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bundle_dir: None,
            encoder_name: default_encoder_name(),
            probe_name: default_probe_name(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - GREENFIX_OUTPUT_DIR -> output.directory
    /// - GREENFIX_OUTPUT_FORMAT -> output.format
    /// - GREENFIX_QUALITY -> output.quality
    /// - GREENFIX_SCALE_ENABLED -> scale.enabled
    /// - GREENFIX_SCALE_FACTOR -> scale.factor
    /// - GREENFIX_SCALE_ALGORITHM -> scale.algorithm
    /// - GREENFIX_BUNDLE_DIR -> tools.bundle_dir
    ///
    /// Values that fail to parse leave the existing setting untouched.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("GREENFIX_OUTPUT_DIR") {
            if !val.trim().is_empty() {
                self.output.directory = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("GREENFIX_OUTPUT_FORMAT") {
            if let Ok(format) = val.parse::<OutputFormat>() {
                self.output.format = format;
            }
        }

        if let Ok(val) = env::var("GREENFIX_QUALITY") {
            if let Ok(quality) = val.parse::<QualityTier>() {
                self.output.quality = quality;
            }
        }

        if let Ok(val) = env::var("GREENFIX_SCALE_ENABLED") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.scale.enabled = true,
                "false" | "0" | "no" => self.scale.enabled = false,
                _ => {}
            }
        }

        if let Ok(val) = env::var("GREENFIX_SCALE_FACTOR") {
            if let Ok(factor) = val.parse::<ScaleFactor>() {
                self.scale.factor = factor;
            }
        }

        if let Ok(val) = env::var("GREENFIX_SCALE_ALGORITHM") {
            if let Ok(algorithm) = val.parse::<ScaleAlgorithm>() {
                self.scale.algorithm = algorithm;
            }
        }

        if let Ok(val) = env::var("GREENFIX_BUNDLE_DIR") {
            if !val.trim().is_empty() {
                self.tools.bundle_dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults instead of an error
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("GREENFIX_OUTPUT_DIR");
        env::remove_var("GREENFIX_OUTPUT_FORMAT");
        env::remove_var("GREENFIX_QUALITY");
        env::remove_var("GREENFIX_SCALE_ENABLED");
        env::remove_var("GREENFIX_SCALE_FACTOR");
        env::remove_var("GREENFIX_SCALE_ALGORITHM");
        env::remove_var("GREENFIX_BUNDLE_DIR");
    }

    fn format_strategy() -> impl Strategy<Value = OutputFormat> {
        prop::sample::select(OutputFormat::ALL.to_vec())
    }

    fn quality_strategy() -> impl Strategy<Value = QualityTier> {
        prop_oneof![
            Just(QualityTier::Low),
            Just(QualityTier::Medium),
            Just(QualityTier::High),
        ]
    }

    fn factor_strategy() -> impl Strategy<Value = ScaleFactor> {
        prop::sample::select(ScaleFactor::ALL.to_vec())
    }

    fn algorithm_strategy() -> impl Strategy<Value = ScaleAlgorithm> {
        prop_oneof![
            Just(ScaleAlgorithm::Lanczos),
            Just(ScaleAlgorithm::Bicubic),
            Just(ScaleAlgorithm::Bilinear),
            Just(ScaleAlgorithm::Nearest),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            dir in "[a-z][a-z0-9_]{0,15}",
            format in format_strategy(),
            quality in quality_strategy(),
            enabled in proptest::bool::ANY,
            factor in factor_strategy(),
            algorithm in algorithm_strategy(),
        ) {
            let toml_str = format!(
                r#"
[output]
directory = "{}"
format = "{}"
quality = "{}"

[scale]
enabled = {}
factor = {}
algorithm = "{}"
"#,
                dir,
                format,
                quality,
                enabled,
                factor.as_f64(),
                algorithm,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.output.directory, PathBuf::from(&dir));
            prop_assert_eq!(config.output.format, format);
            prop_assert_eq!(config.output.quality, quality);
            prop_assert_eq!(config.scale.enabled, enabled);
            prop_assert_eq!(config.scale.factor, factor);
            prop_assert_eq!(config.scale.algorithm, algorithm);
        }

        #[test]
        fn prop_env_overrides_scale_factor(
            initial in factor_strategy(),
            override_factor in factor_strategy(),
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[scale]\nfactor = \"{}\"\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("GREENFIX_SCALE_FACTOR", override_factor.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scale.factor, override_factor);
        }

        #[test]
        fn prop_env_overrides_scale_enabled(
            initial in proptest::bool::ANY,
            override_enabled in proptest::bool::ANY,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[scale]\nenabled = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("GREENFIX_SCALE_ENABLED", override_enabled.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scale.enabled, override_enabled);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.output.directory, PathBuf::from("converted_videos"));
        assert_eq!(config.output.format, OutputFormat::Mp4);
        assert_eq!(config.output.quality, QualityTier::High);
        assert!(!config.scale.enabled);
        assert_eq!(config.scale.factor, ScaleFactor::X2);
        assert_eq!(config.scale.algorithm, ScaleAlgorithm::Lanczos);
        assert_eq!(config.tools.bundle_dir, None);
        assert_eq!(config.tools.encoder_name, "ffmpeg");
        assert_eq!(config.tools.probe_name, "ffprobe");
    }

    #[test]
    fn test_scale_factor_accepts_string_form() {
        let config = Config::parse_toml("[scale]\nfactor = \"1.5x\"\n").expect("Valid TOML");
        assert_eq!(config.scale.factor, ScaleFactor::X1_5);
    }

    #[test]
    fn test_unsupported_scale_factor_is_rejected() {
        let result = Config::parse_toml("[scale]\nfactor = 5\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("GREENFIX_OUTPUT_FORMAT", "webm");
        env::set_var("GREENFIX_QUALITY", "ultra");
        env::set_var("GREENFIX_SCALE_ENABLED", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides_paths() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("GREENFIX_OUTPUT_DIR", "/srv/fixed");
        env::set_var("GREENFIX_BUNDLE_DIR", "/opt/greenfix/bin");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.output.directory, PathBuf::from("/srv/fixed"));
        assert_eq!(config.tools.bundle_dir, Some(PathBuf::from("/opt/greenfix/bin")));
    }

    #[test]
    fn test_load_or_default_with_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default("/nonexistent/greenfix/config.toml")
            .expect("missing file should fall back to defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let result = Config::load_from_file("/nonexistent/greenfix/config.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

//! User-selectable transcoding options
//!
//! These enums are shared by the configuration file, the environment overrides
//! and the command line, so each one parses from the same short names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when an option value cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptionError {
    /// Which option was being parsed (e.g. "output format")
    pub option: &'static str,
    /// The rejected input
    pub value: String,
    /// Accepted spellings, for the error message
    pub expected: &'static str,
}

impl fmt::Display for ParseOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}' (expected one of: {})",
            self.option, self.value, self.expected
        )
    }
}

impl std::error::Error for ParseOptionError {}

/// Container format of the repaired file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Avi,
    Mkv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Mp4,
        OutputFormat::Mov,
        OutputFormat::Avi,
        OutputFormat::Mkv,
    ];

    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
            OutputFormat::Avi => "avi",
            OutputFormat::Mkv => "mkv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.extension() == normalized)
            .ok_or_else(|| ParseOptionError {
                option: "output format",
                value: s.to_string(),
                expected: "mp4, mov, avi, mkv",
            })
    }
}

/// Named encoder speed/quality/bitrate bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" | "med" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            _ => Err(ParseOptionError {
                option: "quality tier",
                value: s.to_string(),
                expected: "low, medium, high",
            }),
        }
    }
}

/// Linear upscale multiplier offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "ScaleFactorRepr", into = "f64")]
pub enum ScaleFactor {
    X1_5,
    #[default]
    X2,
    X3,
    X4,
}

impl ScaleFactor {
    pub const ALL: [ScaleFactor; 4] = [
        ScaleFactor::X1_5,
        ScaleFactor::X2,
        ScaleFactor::X3,
        ScaleFactor::X4,
    ];

    pub fn as_f64(&self) -> f64 {
        match self {
            ScaleFactor::X1_5 => 1.5,
            ScaleFactor::X2 => 2.0,
            ScaleFactor::X3 => 3.0,
            ScaleFactor::X4 => 4.0,
        }
    }

    fn from_f64(value: f64) -> Option<Self> {
        ScaleFactor::ALL
            .into_iter()
            .find(|factor| (factor.as_f64() - value).abs() < f64::EPSILON)
    }
}

impl From<ScaleFactor> for f64 {
    fn from(factor: ScaleFactor) -> Self {
        factor.as_f64()
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

const SCALE_FACTOR_EXPECTED: &str = "1.5, 2, 3, 4 (optionally suffixed with x)";

impl FromStr for ScaleFactor {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed
            .strip_suffix('x')
            .or_else(|| trimmed.strip_suffix('X'))
            .unwrap_or(trimmed);

        number
            .parse::<f64>()
            .ok()
            .and_then(ScaleFactor::from_f64)
            .ok_or_else(|| ParseOptionError {
                option: "scale factor",
                value: s.to_string(),
                expected: SCALE_FACTOR_EXPECTED,
            })
    }
}

/// Accepts both `factor = 2` and `factor = "2x"` in TOML
#[derive(Deserialize)]
#[serde(untagged)]
enum ScaleFactorRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<ScaleFactorRepr> for ScaleFactor {
    type Error = ParseOptionError;

    fn try_from(repr: ScaleFactorRepr) -> Result<Self, Self::Error> {
        match repr {
            ScaleFactorRepr::Number(value) => {
                ScaleFactor::from_f64(value).ok_or_else(|| ParseOptionError {
                    option: "scale factor",
                    value: value.to_string(),
                    expected: SCALE_FACTOR_EXPECTED,
                })
            }
            ScaleFactorRepr::Text(text) => text.parse(),
        }
    }
}

/// Resampling kernel used by the scale filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleAlgorithm {
    #[default]
    Lanczos,
    Bicubic,
    Bilinear,
    Nearest,
}

impl ScaleAlgorithm {
    /// Value for the scale filter's `flags=` parameter
    pub fn as_flag(&self) -> &'static str {
        match self {
            ScaleAlgorithm::Lanczos => "lanczos",
            ScaleAlgorithm::Bicubic => "bicubic",
            ScaleAlgorithm::Bilinear => "bilinear",
            ScaleAlgorithm::Nearest => "neighbor",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleAlgorithm::Lanczos => "lanczos",
            ScaleAlgorithm::Bicubic => "bicubic",
            ScaleAlgorithm::Bilinear => "bilinear",
            ScaleAlgorithm::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ScaleAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleAlgorithm {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lanczos" => Ok(ScaleAlgorithm::Lanczos),
            "bicubic" => Ok(ScaleAlgorithm::Bicubic),
            "bilinear" => Ok(ScaleAlgorithm::Bilinear),
            "nearest" | "neighbor" => Ok(ScaleAlgorithm::Nearest),
            _ => Err(ParseOptionError {
                option: "scale algorithm",
                value: s.to_string(),
                expected: "lanczos, bicubic, bilinear, nearest",
            }),
        }
    }
}

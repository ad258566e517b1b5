//! Probing source resolution with the external probe tool.
//!
//! Only the first video stream's width and height are needed, so the probe
//! is asked for a single `width,height` CSV line instead of full JSON.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe tool could not be located.
    #[error("probe tool unavailable: {0}")]
    Unavailable(String),

    /// The probe tool ran but reported failure.
    #[error("probe failed: {0}")]
    Failed(String),

    /// The output was not a `width,height` pair.
    #[error("could not parse probe output: {0:?}")]
    Parse(String),

    /// IO error while running the probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pixel dimensions of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Arguments that make the probe print `width,height` for the first video stream.
pub fn probe_args(input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height",
        "-of",
        "csv=p=0",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(input.as_os_str().to_owned());
    args
}

/// Runs the probe tool against `input` and parses its output.
pub async fn probe_dimensions(probe_tool: &Path, input: &Path) -> Result<Dimensions, ProbeError> {
    let output = Command::new(probe_tool)
        .args(probe_args(input))
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Failed(format!(
            "exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `width,height` from the first non-empty line of probe output.
///
/// A trailing comma is tolerated; both values must be positive integers.
pub fn parse_dimensions(text: &str) -> Result<Dimensions, ProbeError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ProbeError::Parse(text.to_string()))?;

    let mut fields = line.trim_end_matches(',').split(',').map(str::trim);
    let parse_field = |field: Option<&str>| -> Option<u32> {
        field.and_then(|f| f.parse::<u32>().ok()).filter(|v| *v > 0)
    };

    let width = parse_field(fields.next());
    let height = parse_field(fields.next());

    match (width, height, fields.next()) {
        (Some(width), Some(height), None) => Ok(Dimensions { width, height }),
        _ => Err(ProbeError::Parse(line.to_string())),
    }
}

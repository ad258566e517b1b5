//! Encoder invocation: argument translation and process supervision.

pub mod args;
pub mod runner;

pub use args::{
    clamp_scale, quality_params, translate, QualityParams, ScaleClamp, Translation, Translator,
};
pub use runner::{classify_exit, is_progress_line, run, ExitKind, ACCESS_VIOLATION_EXIT_CODE};

use crate::jobs::JobId;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Everything needed to run the encoder for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderInvocation {
    pub job_id: JobId,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// A scale filter is part of `args`.
    pub scaling: bool,
}

impl EncoderInvocation {
    pub fn new(
        job_id: JobId,
        program: PathBuf,
        translation: Translation,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            job_id,
            program,
            scaling: translation.is_scaling(),
            args: translation.args,
            input_path,
            output_path,
        }
    }

    /// Command with both output streams piped and no stdin.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }
        cmd
    }

    /// Space-joined command line, for logs only.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

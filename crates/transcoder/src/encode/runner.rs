//! Running one encoder process and classifying how it ended.
//!
//! Both output streams are read concurrently and merged in arrival order.
//! Lines carrying frame/speed markers become status events; all other lines are
//! forwarded as log lines. Nothing here returns an error: every failure ends up
//! as a [`JobOutcome`].

use super::EncoderInvocation;
use crate::events::{BatchEvent, EventSink};
use crate::jobs::{JobId, JobOutcome, JobResult};
use std::process::ExitStatus;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// STATUS_ACCESS_VIOLATION as reported by `ExitStatus::code()` on Windows.
pub const ACCESS_VIOLATION_EXIT_CODE: i32 = 0xC000_0005_u32 as i32;

/// SIGSEGV, plus SIGKILL as delivered by the Linux OOM killer.
const CRASH_SIGNALS: [i32; 2] = [11, 9];

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    /// Terminated by a signal (Unix only).
    Signal(i32),
}

impl ExitKind {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitKind::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitKind::Signal(signal);
            }
        }
        ExitKind::Code(-1)
    }
}

/// Map a process exit onto a job outcome.
///
/// An access violation only counts as a crash while a scale filter is active;
/// otherwise it is an ordinary failure. Signals are reported as `128 + signal`.
pub fn classify_exit(exit: ExitKind, scaling: bool) -> JobOutcome {
    match exit {
        ExitKind::Code(0) => JobOutcome::Success,
        ExitKind::Code(code) if scaling && code == ACCESS_VIOLATION_EXIT_CODE => {
            JobOutcome::EncoderCrash { exit_code: code }
        }
        ExitKind::Code(code) => JobOutcome::EncoderFailure { exit_code: code },
        ExitKind::Signal(signal) if scaling && CRASH_SIGNALS.contains(&signal) => {
            JobOutcome::EncoderCrash {
                exit_code: 128 + signal,
            }
        }
        ExitKind::Signal(signal) => JobOutcome::EncoderFailure {
            exit_code: 128 + signal,
        },
    }
}

/// Encoder progress lines carry a frame counter or a speed figure.
pub fn is_progress_line(line: &str) -> bool {
    line.contains("frame=") || line.contains("speed=")
}

fn route_line(job_id: JobId, text: String, sink: &dyn EventSink) {
    if is_progress_line(&text) {
        sink.emit(BatchEvent::Status { job_id, text });
    } else {
        sink.emit(BatchEvent::LogLine { job_id, text });
    }
}

/// Splits a byte stream on `\n` and `\r`; the encoder rewrites its progress
/// line with bare carriage returns.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
        (!line.is_empty()).then_some(line)
    }
}

async fn forward_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading encoder output");
                break;
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send(line);
    }
}

async fn supervise(invocation: &EncoderInvocation, sink: &dyn EventSink) -> JobOutcome {
    tracing::debug!(
        job_id = %invocation.job_id,
        command = %invocation.command_line(),
        "spawning encoder"
    );

    let mut child = match invocation.to_command().spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(
                job_id = %invocation.job_id,
                program = %invocation.program.display(),
                error = %e,
                "failed to start encoder"
            );
            return JobOutcome::EncoderMissing {
                reason: e.to_string(),
            };
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
    }
    drop(tx);

    while let Some(line) = rx.recv().await {
        route_line(invocation.job_id, line, sink);
    }
    for reader in readers {
        let _ = reader.await;
    }

    match child.wait().await {
        Ok(status) => classify_exit(ExitKind::from_status(status), invocation.scaling),
        Err(e) => {
            tracing::warn!(job_id = %invocation.job_id, error = %e, "failed to wait for encoder");
            JobOutcome::EncoderFailure { exit_code: -1 }
        }
    }
}

/// Run the encoder to completion, streaming its output into `sink`.
pub async fn run(invocation: &EncoderInvocation, sink: &dyn EventSink) -> JobResult {
    let outcome = supervise(invocation, sink).await;
    JobResult {
        job_id: invocation.job_id,
        input_path: invocation.input_path.clone(),
        output_path: invocation.output_path.clone(),
        outcome,
    }
}

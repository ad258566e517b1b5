//! Events delivered to the interactive surface while a batch runs.
//!
//! The orchestrator never touches UI state directly; it pushes [`BatchEvent`]s
//! into an [`EventSink`] in the order they are generated.

use crate::jobs::{BatchSummary, JobId};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Why a warning was raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// The requested upscale was lowered to fit the memory/resolution budget.
    ScaleClamped { original: f64, clamped: f64 },
    /// Source dimensions could not be probed; the job runs unscaled.
    ProbeFailed,
    /// The encoder crashed under memory pressure.
    EncoderCrashed,
    /// Anything else worth surfacing.
    General,
}

/// A single event emitted by a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A batch has taken its snapshot; controls should be disabled.
    BatchStarted { total: usize },
    /// Emitted before each job and once more at 100% after the last one.
    Progress {
        completed: usize,
        total: usize,
        percent: f64,
        current_file: Option<String>,
    },
    /// Encoder progress line (frame count / speed), verbatim.
    Status { job_id: JobId, text: String },
    /// Any other encoder output line, verbatim.
    LogLine { job_id: JobId, text: String },
    Warning {
        job_id: Option<JobId>,
        kind: WarningKind,
        text: String,
    },
    /// A batch-level precondition failed; no job was started.
    Aborted { reason: String },
    Complete { summary: BatchSummary },
    /// Always the last event of a run; controls may be re-enabled.
    BatchEnded,
}

impl BatchEvent {
    pub fn progress(completed: usize, total: usize, current_file: Option<String>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        BatchEvent::Progress {
            completed,
            total,
            percent,
            current_file,
        }
    }

    pub fn warning(job_id: Option<JobId>, kind: WarningKind, text: impl Into<String>) -> Self {
        BatchEvent::Warning {
            job_id,
            kind,
            text: text.into(),
        }
    }
}

/// Receiver of batch events, owned by the presentation layer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BatchEvent);
}

/// Forwards events over an unbounded tokio channel.
///
/// A dropped receiver is not an error; events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: BatchEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BatchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: BatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        match BatchEvent::progress(1, 4, Some("clip.mov".to_string())) {
            BatchEvent::Progress { percent, .. } => assert!((percent - 25.0).abs() < 1e-9),
            other => panic!("unexpected event {:?}", other),
        }
        match BatchEvent::progress(4, 4, None) {
            BatchEvent::Progress { percent, .. } => assert!((percent - 100.0).abs() < 1e-9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.emit(BatchEvent::BatchStarted { total: 1 });
        sink.emit(BatchEvent::progress(0, 1, None));
        sink.emit(BatchEvent::BatchEnded);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], BatchEvent::BatchStarted { total: 1 });
        assert_eq!(events[2], BatchEvent::BatchEnded);
    }

    #[tokio::test]
    async fn test_channel_sink_ignores_closed_receiver() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(BatchEvent::BatchStarted { total: 2 });
        assert_eq!(rx.recv().await, Some(BatchEvent::BatchStarted { total: 2 }));

        drop(rx);
        sink.emit(BatchEvent::BatchEnded);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(BatchEvent::warning(
            None,
            WarningKind::ScaleClamped {
                original: 4.0,
                clamped: 2.0,
            },
            "scale lowered",
        ))
        .expect("event should serialize");

        assert_eq!(json["event"], "warning");
        assert_eq!(json["kind"]["kind"], "scale_clamped");
        assert_eq!(json["kind"]["clamped"], 2.0);
    }
}

//! The Event Emitter contract (spec §4.I / §6).
//!
//! Replaces the source's implicit global emitter with an explicit capability passed
//! into every long-running component at construction (spec §9's redesign note). A
//! [`NoopEmitter`] is provided for tests and dry runs; a [`ChannelEmitter`] backed by
//! an `mpsc` channel is the process-wide convenience facade the UI layer consumes.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tokio::sync::mpsc;

/// Which phase of a streaming job a progress event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    /// Transferring documents (for CSV export this maps into `[0, 80]`).
    Downloading,
    /// Finalizing output (for CSV export this maps into `[80, 100]`).
    Writing,
}

/// `export:progress` / `import:progress` payload (spec §6).
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    /// The export or import job id.
    pub job_id: String,
    /// Current phase.
    pub phase: JobPhase,
    /// Database currently being processed.
    pub database: String,
    /// Collection currently being processed.
    pub collection: String,
    /// Current position against `total`. Invariant: `current <= total`.
    pub current: u64,
    /// Fixed denominator for this job.
    pub total: u64,
    /// Running count of documents processed so far in this collection.
    pub processed_docs: u64,
}

/// `export:complete` / `import:complete` payload (spec §6).
#[derive(Clone, Debug, Serialize)]
pub struct CompleteEvent {
    /// The export or import job id.
    pub job_id: String,
    /// Output file path, when applicable (imports read from a path instead).
    pub file_path: Option<String>,
    /// Database the job covered (empty string for multi-database jobs).
    pub database: String,
    /// Collection the job covered (empty string for multi-collection jobs).
    pub collection: String,
}

/// `export:cancelled` / `import:cancelled` payload (spec §6).
#[derive(Clone, Debug, Serialize)]
pub struct CancelledEvent {
    /// The export or import job id.
    pub job_id: String,
    /// Database in flight at the time of cancellation.
    pub database: String,
    /// Collection in flight at the time of cancellation.
    pub collection: String,
}

/// `export:error` / `import:error` payload.
#[derive(Clone, Debug, Serialize)]
pub struct JobErrorEvent {
    /// The export or import job id.
    pub job_id: String,
    /// Human-readable error message.
    pub message: String,
}

/// `debug:log` payload.
#[derive(Clone, Debug, Serialize)]
pub struct DebugLogEvent {
    /// Free-form category, e.g. `"export"`, `"credentials"`.
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail map.
    pub detail: Option<BTreeMap<String, String>>,
}

/// The full set of wire-visible events the core can emit (spec §4.I).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum CoreEvent {
    /// `export:progress`
    #[serde(rename = "export:progress")]
    ExportProgress(ProgressEvent),
    /// `export:complete`
    #[serde(rename = "export:complete")]
    ExportComplete(CompleteEvent),
    /// `export:cancelled`
    #[serde(rename = "export:cancelled")]
    ExportCancelled(CancelledEvent),
    /// `export:error`
    #[serde(rename = "export:error")]
    ExportError(JobErrorEvent),
    /// `import:progress`
    #[serde(rename = "import:progress")]
    ImportProgress(ProgressEvent),
    /// `import:complete`
    #[serde(rename = "import:complete")]
    ImportComplete(CompleteEvent),
    /// `import:cancelled`
    #[serde(rename = "import:cancelled")]
    ImportCancelled(CancelledEvent),
    /// `import:error`
    #[serde(rename = "import:error")]
    ImportError(JobErrorEvent),
    /// `debug:log`
    #[serde(rename = "debug:log")]
    DebugLog(DebugLogEvent),
    /// `app:warning`
    #[serde(rename = "app:warning")]
    AppWarning {
        /// The warning message surfaced to the UI.
        message: String,
    },
}

/// A capability injected into the core's long-running components. Implementations
/// must not block the caller — `emit` should enqueue/forward and return immediately.
pub trait EventEmitter: Send + Sync {
    /// Delivers an event to whatever observer this emitter represents.
    fn emit(&self, event: CoreEvent);
}

/// An emitter that discards every event. Used by dry runs and tests that don't care
/// about progress telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: CoreEvent) {}
}

/// An emitter backed by a bounded `tokio::sync::mpsc` channel. This is the
/// process-wide convenience facade: the UI layer owns the `Receiver` and forwards
/// events to its rendering/IPC layer however it sees fit.
#[derive(Clone)]
pub struct ChannelEmitter {
    sender: mpsc::Sender<CoreEvent>,
}

impl ChannelEmitter {
    /// Creates a new channel-backed emitter with the given buffer capacity, returning
    /// the emitter and the receiver end.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<CoreEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: CoreEvent) {
        // A full channel means the UI has stopped draining events; dropping the event
        // here is preferable to blocking the worker that is trying to make progress.
        if let Err(e) = self.sender.try_send(event) {
            tracing::debug!(error = %e, "dropped event, receiver not keeping up or closed");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn channel_emitter_forwards_events() {
        let (emitter, mut rx) = ChannelEmitter::new(8);
        emitter.emit(CoreEvent::AppWarning {
            message: "keyring unavailable".into(),
        });
        let event = rx.recv().await.unwrap();
        match event {
            CoreEvent::AppWarning { message } => assert_eq!(message, "keyring unavailable"),
            _ => panic!("unexpected event"),
        }
    }

    #[test]
    fn noop_emitter_does_not_panic() {
        NoopEmitter.emit(CoreEvent::DebugLog(DebugLogEvent {
            category: "test".into(),
            message: "hello".into(),
            detail: None,
        }));
    }
}

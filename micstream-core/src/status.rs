//! Connectivity status events.
//!
//! Both channels report what they are doing through a [`StatusReporter`].
//! Reporting uses `try_send` on a bounded queue, so a slow or absent
//! consumer can never stall the audio loop or the touch worker; when the
//! queue is full the event is dropped.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

/// Default depth of the status queue.
pub const STATUS_QUEUE_DEPTH: usize = 64;

/// Which channel produced a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSource {
    Touch,
    Audio,
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSource::Touch => write!(f, "Touch"),
            StatusSource::Audio => write!(f, "Audio"),
        }
    }
}

/// One connectivity update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub source: StatusSource,
    pub connected: bool,
    pub message: String,
}

impl StatusEvent {
    /// Whether this marks the end of an audio session (stopped, ended or
    /// failed). Touch failures never do.
    pub fn ends_audio_session(&self) -> bool {
        self.source == StatusSource::Audio && !self.connected
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dot = if self.connected { "●" } else { "○" };
        write!(f, "{dot} {}: {}", self.source, self.message)
    }
}

/// Cloneable, non-blocking sender half of the status queue.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    source: StatusSource,
    tx: Option<mpsc::Sender<StatusEvent>>,
}

impl StatusReporter {
    /// Create a reporter for `source` writing into `tx`.
    pub fn new(source: StatusSource, tx: mpsc::Sender<StatusEvent>) -> Self {
        Self {
            source,
            tx: Some(tx),
        }
    }

    /// A reporter that discards everything.
    pub fn disabled(source: StatusSource) -> Self {
        Self { source, tx: None }
    }

    /// The same queue, tagged with a different source.
    pub fn for_source(&self, source: StatusSource) -> Self {
        Self {
            source,
            tx: self.tx.clone(),
        }
    }

    pub fn source(&self) -> StatusSource {
        self.source
    }

    /// Publish an update. Never blocks.
    pub fn report(&self, connected: bool, message: impl Into<String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = StatusEvent {
            source: self.source,
            connected,
            message: message.into(),
        };
        if let Err(e) = tx.try_send(event) {
            debug!("status event dropped: {e}");
        }
    }
}

/// Create a status queue and a reporter tagged with `source`.
pub fn status_channel(source: StatusSource) -> (StatusReporter, mpsc::Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel(STATUS_QUEUE_DEPTH);
    (StatusReporter::new(source, tx), rx)
}

// ── Tests ────────────────────────────────────────────────────────

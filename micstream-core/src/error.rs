//! Domain-specific error types for the MicStream sender.
//!
//! All fallible library operations return `Result<T, StreamError>`.
//! The touch channel and the audio pipeline never hand these back to the
//! caller directly; they turn them into status events at their boundary.

use thiserror::Error;

/// Longest status message shown to the user.
pub const MAX_STATUS_LEN: usize = 50;

/// The canonical error type for the MicStream library.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Device Errors ────────────────────────────────────────────
    /// The capture device could not be opened or configured.
    #[error("failed to init mic: {0}")]
    DeviceInit(String),

    /// The capture device failed while recording.
    #[error("capture device error: {0}")]
    Device(String),

    // ── Resolution Errors ────────────────────────────────────────
    /// The destination host name could not be resolved.
    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no usable address.
    #[error("no address for {0}")]
    NoAddress(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Interface binding failed (non-fatal, only reported).
    #[error("interface bind failed: {0}")]
    Bind(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A tag byte did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A datagram had the wrong length for its format.
    #[error("invalid packet length: expected {expected}, got {actual}")]
    InvalidPacketLength { expected: usize, actual: usize },

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// A work queue was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// A streaming session is already active.
    #[error("already streaming")]
    AlreadyRunning,

    /// A configuration value was rejected.
    #[error("invalid config: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Human-readable status text, capped at [`MAX_STATUS_LEN`] characters.
    pub fn status_text(&self) -> String {
        format!("Error: {}", truncate_message(&self.to_string(), MAX_STATUS_LEN))
    }
}

/// Cap `msg` at `max` characters without splitting a code point.
pub fn truncate_message(msg: &str, max: usize) -> String {
    match msg.char_indices().nth(max) {
        Some((idx, _)) => msg[..idx].to_string(),
        None => msg.to_string(),
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::ChannelClosed
    }
}

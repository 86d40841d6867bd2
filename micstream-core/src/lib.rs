//! # micstream-core
//!
//! Streams microphone PCM and touch events from a phone-class device to a
//! car head unit over two UDP ports.
//!
//! This crate contains:
//! - **Codec**: `TouchEvent` and its 5-byte wire form, `TouchCodec` for `UdpFramed`
//! - **Binder**: `TransportBinder` pinning sockets to a WiFi/Ethernet/cellular interface
//! - **Touch**: `TouchChannel`, a FIFO gesture queue with a self-healing UDP link
//! - **Audio**: `AudioStreamer`, the capture → datagram pipeline on its own thread
//! - **Input**: pointer mapping and the remote shortcut buttons
//! - **Status**: `StatusReporter` events for a UI or log
//! - **Config / Error**: TOML settings and the `StreamError` hierarchy

pub mod audio;
pub mod binder;
pub mod codec;
pub mod config;
pub mod error;
pub mod input;
pub mod status;
pub mod touch;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{
    AudioStreamer, CaptureDevice, CaptureSource, CommandCapture, FileCapture, PipelineSettings,
    PipelineState, StdinCapture, StreamTarget,
};
#[cfg(feature = "cpal")]
pub use audio::CpalCapture;
pub use binder::{BindOutcome, TransportBinder, TransportClass};
pub use codec::{SCREEN_HEIGHT, SCREEN_WIDTH, TouchCodec, TouchEvent, TouchKind};
pub use config::StreamConfig;
pub use error::StreamError;
pub use input::{PointerPhase, RemoteAction, ScreenMapper, TouchSurface};
pub use status::{StatusEvent, StatusReporter, StatusSource, status_channel};
pub use touch::{Gesture, GestureTiming, TouchChannel, UdpConnector};

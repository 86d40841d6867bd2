//! Audio streaming pipeline.
//!
//! ```text
//!  Idle ──start──► Starting ──device ok──► Streaming ──stop──► Stopping ──joined──► Idle
//!                      │                        │
//!                      └──device/setup error────┴──error / device ended──► Idle
//! ```
//!
//! Each session runs on its own OS thread: open the device, resolve the
//! destination, bind the socket once, then read one frame and send it as
//! one datagram until told to stop. There is no queue between capture and
//! send; a slow network throttles capture through the blocking send.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::audio::device::{CaptureDevice, CaptureParams, CaptureSource, Interrupter};
use crate::binder::TransportBinder;
use crate::config::AudioConfig;
use crate::error::StreamError;
use crate::status::StatusReporter;
use crate::touch::link::unspecified_for;

// ── PipelineState ────────────────────────────────────────────────

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

// ── Settings ─────────────────────────────────────────────────────

/// Per-session tuning, derived from [`AudioConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub sample_rate: u32,
    pub frame_bytes: usize,
    pub device_buffer: usize,
    pub status_every: u64,
    pub join_timeout: Duration,
    pub send_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for PipelineSettings {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            frame_bytes: cfg.frame_bytes(),
            device_buffer: cfg.device_buffer(),
            status_every: cfg.status_every.max(1),
            join_timeout: cfg.join_timeout(),
            send_timeout: cfg.send_timeout(),
        }
    }
}

/// Where the audio goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub host: String,
    pub port: u16,
}

impl StreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── AudioStreamer ────────────────────────────────────────────────

/// Published by the worker once its device is open.
type SharedInterrupter = Arc<Mutex<Option<Interrupter>>>;

struct Session {
    running: Arc<AtomicBool>,
    state: Arc<Mutex<PipelineState>>,
    interrupt: SharedInterrupter,
    done_rx: std_mpsc::Receiver<u64>,
    handle: JoinHandle<()>,
}

/// Control-surface handle that starts and stops streaming sessions.
pub struct AudioStreamer {
    source: Arc<dyn CaptureSource>,
    binder: TransportBinder,
    settings: PipelineSettings,
    status: StatusReporter,
    session: Option<Session>,
}

impl AudioStreamer {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        binder: TransportBinder,
        settings: PipelineSettings,
        status: StatusReporter,
    ) -> Self {
        Self {
            source,
            binder,
            settings,
            status,
            session: None,
        }
    }

    /// Current state of the active session, `Idle` if there is none.
    pub fn state(&self) -> PipelineState {
        self.session
            .as_ref()
            .map(|s| lock_state(&s.state))
            .unwrap_or(PipelineState::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == PipelineState::Streaming
    }

    /// Begin a session towards `target`.
    ///
    /// Returns [`StreamError::AlreadyRunning`] if a session is still
    /// active. Everything that goes wrong after this point is reported
    /// through the status channel instead.
    pub fn start(&mut self, target: StreamTarget) -> Result<(), StreamError> {
        if let Some(session) = &self.session {
            if lock_state(&session.state) != PipelineState::Idle && !session.handle.is_finished() {
                return Err(StreamError::AlreadyRunning);
            }
        }
        // Reap a session that ended on its own; its thread is past teardown.
        if let Some(old) = self.session.take() {
            let _ = old.handle.join();
        }

        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(PipelineState::Starting));
        let interrupt = SharedInterrupter::default();
        let (done_tx, done_rx) = std_mpsc::channel();

        let worker = SessionWorker {
            source: Arc::clone(&self.source),
            binder: self.binder.clone(),
            settings: self.settings,
            status: self.status.clone(),
            running: Arc::clone(&running),
            state: Arc::clone(&state),
            interrupt: Arc::clone(&interrupt),
            target,
        };

        let handle = thread::Builder::new()
            .name("micstream-audio".into())
            .spawn(move || {
                let sent = worker.run();
                let _ = done_tx.send(sent);
            })?;

        self.session = Some(Session {
            running,
            state,
            interrupt,
            done_rx,
            handle,
        });
        Ok(())
    }

    /// Stop the active session and wait for teardown, at most
    /// `join_timeout`. A device read blocked inside the session is
    /// interrupted. Calling this with no active session does nothing.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.running.store(false, Ordering::SeqCst);
        {
            let mut state = session.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state != PipelineState::Idle {
                *state = PipelineState::Stopping;
            }
        }
        interrupt(&session.interrupt);

        match session.done_rx.recv_timeout(self.settings.join_timeout) {
            Ok(sent) => {
                let _ = session.handle.join();
                info!("audio session stopped after {sent} packets");
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                // Worker panicked before reporting.
                let _ = session.handle.join();
                warn!("audio worker exited without a summary");
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                // The device may have been published after the first call.
                interrupt(&session.interrupt);
                warn!(
                    "audio worker still busy after {:?}; detaching",
                    self.settings.join_timeout
                );
            }
        }
        set_state(&session.state, PipelineState::Idle);
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── SessionWorker ────────────────────────────────────────────────

/// How a session that didn't fail came to an end.
enum SessionEnd {
    Stopped(u64),
    DeviceEnded(u64),
}

struct SessionWorker {
    source: Arc<dyn CaptureSource>,
    binder: TransportBinder,
    settings: PipelineSettings,
    status: StatusReporter,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<PipelineState>>,
    interrupt: SharedInterrupter,
    target: StreamTarget,
}

impl SessionWorker {
    /// Run the whole session; returns the number of datagrams sent.
    fn run(self) -> u64 {
        let mut device: Option<Box<dyn CaptureDevice>> = None;
        let mut socket: Option<UdpSocket> = None;
        let mut sent = 0u64;

        let outcome = self.stream(&mut device, &mut socket, &mut sent);
        self.interrupt.lock().unwrap_or_else(|p| p.into_inner()).take();
        Self::teardown(device, socket);
        set_state(&self.state, PipelineState::Idle);

        // Reported after teardown so a consumer that sees the final
        // status can start a new session right away.
        match outcome {
            Ok(SessionEnd::Stopped(n)) => {
                self.status.report(false, format!("Stopped ({n} packets sent)"));
            }
            Ok(SessionEnd::DeviceEnded(n)) => {
                info!("capture device ended after {n} packets");
                self.status.report(false, format!("Capture ended ({n} packets sent)"));
            }
            Err(e) => {
                error!("audio session failed: {e}");
                self.status.report(false, e.status_text());
            }
        }
        sent
    }

    fn stream(
        &self,
        device: &mut Option<Box<dyn CaptureDevice>>,
        socket: &mut Option<UdpSocket>,
        sent: &mut u64,
    ) -> Result<SessionEnd, StreamError> {
        let params = CaptureParams {
            sample_rate: self.settings.sample_rate,
            buffer_bytes: self.settings.device_buffer,
        };
        let device = device.insert(self.source.open(&params)?);
        *self.interrupt.lock().unwrap_or_else(|p| p.into_inner()) = device.interrupter();

        let dest = resolve_blocking(&self.target)?;
        let sock = UdpSocket::bind(unspecified_for(&dest))?;
        sock.set_write_timeout(self.settings.send_timeout)?;
        let outcome = self.binder.bind(&sock);
        let sock = socket.insert(sock);

        device.start()?;

        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state != PipelineState::Starting {
                // Stop requested while the device was opening.
                return Ok(SessionEnd::Stopped(0));
            }
            *state = PipelineState::Streaming;
        }

        let msg = format!("Streaming to {} {}", self.target, outcome.label());
        info!("{msg} via {}", self.source.describe());
        self.status.report(true, msg);

        let mut frame = vec![0u8; self.settings.frame_bytes];
        while self.running.load(Ordering::SeqCst) {
            let read = device.read(&mut frame);
            if !self.running.load(Ordering::SeqCst) {
                // Woken by stop(); whatever the read returned is discarded.
                break;
            }
            let n = read?;
            if n == 0 {
                return Ok(SessionEnd::DeviceEnded(*sent));
            }
            sock.send_to(&frame[..n], dest)?;
            *sent += 1;
            if *sent % self.settings.status_every == 0 {
                self.status
                    .report(true, format!("Streaming ({sent} packets sent)"));
            }
        }
        Ok(SessionEnd::Stopped(*sent))
    }

    /// Release everything the session acquired. Each step runs even if an
    /// earlier one failed.
    fn teardown(device: Option<Box<dyn CaptureDevice>>, socket: Option<UdpSocket>) {
        if let Some(mut device) = device {
            if let Err(e) = device.stop() {
                warn!("device stop failed: {e}");
            }
            if let Err(e) = device.release() {
                warn!("device release failed: {e}");
            }
        }
        if let Some(socket) = socket {
            drop(socket);
            debug!("audio socket closed");
        }
    }
}

fn resolve_blocking(target: &StreamTarget) -> Result<SocketAddr, StreamError> {
    (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|source| StreamError::Resolve {
            host: target.host.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| StreamError::NoAddress(target.host.clone()))
}

fn interrupt(slot: &Mutex<Option<Interrupter>>) {
    if let Some(wake) = slot.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
        wake();
    }
}

fn lock_state(state: &Mutex<PipelineState>) -> PipelineState {
    *state.lock().unwrap_or_else(|p| p.into_inner())
}

fn set_state(state: &Mutex<PipelineState>, next: PipelineState) {
    *state.lock().unwrap_or_else(|p| p.into_inner()) = next;
}

// ── Tests ────────────────────────────────────────────────────────

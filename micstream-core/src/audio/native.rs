//! Native microphone capture through cpal (feature `cpal`).
//!
//! A cpal stream is not `Send` on every host, so each device owns a helper
//! thread that builds and plays the stream and forwards the samples as
//! little-endian bytes over a bounded queue. Samples are discarded until
//! `start` and whenever the queue is full.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use crate::audio::device::{CaptureDevice, CaptureParams, CaptureSource, Interrupter};
use crate::error::StreamError;

/// Callback buffers held between the audio host and the session.
const CHUNK_QUEUE: usize = 64;

/// How often blocked reads and the helper thread look at the halt flag.
const POLL: Duration = Duration::from_millis(20);

/// Opens the host's input device (the default one unless named).
#[derive(Debug, Clone, Default)]
pub struct CpalCapture {
    device: Option<String>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the input device called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device: Some(name.into()),
        }
    }
}

impl CaptureSource for CpalCapture {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>, StreamError> {
        let (chunk_tx, chunks) = mpsc::sync_channel(CHUNK_QUEUE);
        let (ready_tx, ready_rx) = mpsc::channel();
        let recording = Arc::new(AtomicBool::new(false));
        let halt = Arc::new(AtomicBool::new(false));

        let helper = HostStream {
            device: self.device.clone(),
            sample_rate: params.sample_rate,
            recording: Arc::clone(&recording),
            halt: Arc::clone(&halt),
        };
        let thread = thread::Builder::new()
            .name("micstream-cpal".into())
            .spawn(move || helper.run(chunk_tx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => info!("cpal input {name} at {} Hz", params.sample_rate),
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(StreamError::DeviceInit("cpal helper exited".into()));
            }
        }

        Ok(Box::new(CpalDevice {
            chunks,
            pending: Vec::new(),
            recording,
            halt,
            thread: Some(thread),
        }))
    }

    fn describe(&self) -> String {
        match &self.device {
            Some(name) => format!("cpal {name}"),
            None => "cpal default input".into(),
        }
    }
}

// ── HostStream ───────────────────────────────────────────────────

/// Everything the helper thread needs to own the cpal stream.
struct HostStream {
    device: Option<String>,
    sample_rate: u32,
    recording: Arc<AtomicBool>,
    halt: Arc<AtomicBool>,
}

impl HostStream {
    fn run(self, chunks: SyncSender<Vec<u8>>, ready: mpsc::Sender<Result<String, StreamError>>) {
        let stream = match self.build(chunks) {
            Ok((stream, name)) => {
                let _ = ready.send(Ok(name));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        while !self.halt.load(Ordering::SeqCst) {
            thread::sleep(POLL);
        }
        // Dropping the stream closes the queue; readers see end of stream.
        drop(stream);
        debug!("cpal stream closed");
    }

    fn build(&self, chunks: SyncSender<Vec<u8>>) -> Result<(cpal::Stream, String), StreamError> {
        let host = cpal::default_host();
        let device = match &self.device {
            Some(wanted) => host
                .input_devices()
                .map_err(init_error)?
                .find(|d| d.name().is_ok_and(|name| name == *wanted)),
            None => host.default_input_device(),
        }
        .ok_or_else(|| StreamError::DeviceInit("no input device".into()))?;
        let name = device.name().unwrap_or_else(|_| "unnamed".into());

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let recording = Arc::clone(&self.recording);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if recording.load(Ordering::Relaxed) {
                        let bytes = data.iter().flat_map(|s| s.to_le_bytes()).collect();
                        let _ = chunks.try_send(bytes);
                    }
                },
                |e| warn!("cpal stream error: {e}"),
                None,
            )
            .map_err(init_error)?;
        stream.play().map_err(init_error)?;
        Ok((stream, name))
    }
}

fn init_error(e: impl fmt::Display) -> StreamError {
    StreamError::DeviceInit(e.to_string())
}

// ── CpalDevice ───────────────────────────────────────────────────

struct CpalDevice {
    chunks: Receiver<Vec<u8>>,
    /// Bytes of the last chunk not yet handed out.
    pending: Vec<u8>,
    recording: Arc<AtomicBool>,
    halt: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureDevice for CpalDevice {
    fn start(&mut self) -> Result<(), StreamError> {
        if self.halt.load(Ordering::SeqCst) {
            return Err(StreamError::Device("device already released".into()));
        }
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.recording.load(Ordering::SeqCst) {
            return Err(StreamError::Device("read while not recording".into()));
        }
        let mut filled = 0;
        while filled < buf.len() {
            if self.pending.is_empty() {
                if self.halt.load(Ordering::SeqCst) {
                    break;
                }
                match self.chunks.recv_timeout(POLL) {
                    Ok(chunk) => self.pending = chunk,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let n = (buf.len() - filled).min(self.pending.len());
            buf[filled..filled + n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            filled += n;
        }
        Ok(filled)
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.recording.store(false, Ordering::SeqCst);
        self.halt.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<(), StreamError> {
        self.halt.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| StreamError::Device("cpal helper panicked".into()))?;
        }
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let halt = Arc::clone(&self.halt);
        Some(Box::new(move || halt.store(true, Ordering::SeqCst)))
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.halt.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Microphone capture devices.
//!
//! A [`CaptureSource`] opens a fresh [`CaptureDevice`] for every streaming
//! session. Devices deliver raw mono s16le PCM through blocking reads that
//! fill a whole frame, so only the last read before the device ends can be
//! short. A read of zero bytes means the device has ended.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::StreamError;

/// Parameters handed to a source when a session opens its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate: u32,
    /// Device-side buffer in bytes (at least two frames).
    pub buffer_bytes: usize,
}

/// Makes a blocked [`CaptureDevice::read`] return from another thread.
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

/// An open microphone.
pub trait CaptureDevice: Send {
    /// Begin recording.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Block until `buf` is full or the device ends. Returns the number of
    /// bytes written; `0` means the device has no more data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;

    /// Stop recording.
    fn stop(&mut self) -> Result<(), StreamError>;

    /// Free the underlying device. Called once, after `stop`.
    fn release(&mut self) -> Result<(), StreamError>;

    /// A handle that wakes a blocked `read`, if the device has one. After
    /// it fires, `read` returns end of stream or an error.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// Opens capture devices.
pub trait CaptureSource: Send + Sync {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>, StreamError>;

    /// Short name for logs.
    fn describe(&self) -> String;
}

/// Read until `buf` is full or `reader` reports end of stream.
pub fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── ReaderCapture ────────────────────────────────────────────────

/// A device backed by any byte stream of raw PCM.
pub struct ReaderCapture<R: Read + Send> {
    reader: Option<BufReader<R>>,
    recording: bool,
}

impl<R: Read + Send> ReaderCapture<R> {
    pub fn new(reader: R, buffer_bytes: usize) -> Self {
        Self {
            reader: Some(BufReader::with_capacity(buffer_bytes, reader)),
            recording: false,
        }
    }
}

impl<R: Read + Send> CaptureDevice for ReaderCapture<R> {
    fn start(&mut self) -> Result<(), StreamError> {
        if self.reader.is_none() {
            return Err(StreamError::Device("device already released".into()));
        }
        self.recording = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.recording {
            return Err(StreamError::Device("read while not recording".into()));
        }
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StreamError::Device("device already released".into()))?;
        read_frame(reader, buf).map_err(|e| StreamError::Device(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.recording = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), StreamError> {
        self.reader = None;
        Ok(())
    }
}

// ── FileCapture / StdinCapture ───────────────────────────────────

/// Streams a raw PCM file (or a FIFO fed by another recorder).
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureSource for FileCapture {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>, StreamError> {
        let file = File::open(&self.path)
            .map_err(|e| StreamError::DeviceInit(format!("{}: {e}", self.path.display())))?;
        Ok(Box::new(ReaderCapture::new(file, params.buffer_bytes)))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Streams raw PCM piped into standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinCapture;

impl CaptureSource for StdinCapture {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>, StreamError> {
        Ok(Box::new(ReaderCapture::new(io::stdin(), params.buffer_bytes)))
    }

    fn describe(&self) -> String {
        "stdin".into()
    }
}

// ── CommandCapture ───────────────────────────────────────────────

/// Records through an external program writing raw PCM to stdout
/// (`arecord`, `parec`, `ffmpeg -f alsa ... -f s16le -`).
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`.
    pub fn from_argv(argv: &[String]) -> Result<Self, StreamError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StreamError::Config("audio.capture_command is empty".into()))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

impl CaptureSource for CommandCapture {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>, StreamError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StreamError::DeviceInit(format!("{}: {e}", self.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::DeviceInit("recorder has no stdout".into()))?;
        info!("recorder {} started (pid {})", self.program, child.id());
        Ok(Box::new(CommandDevice {
            child: Arc::new(Mutex::new(Some(child))),
            inner: ReaderCapture::new(stdout, params.buffer_bytes),
        }))
    }

    fn describe(&self) -> String {
        format!("command {}", self.program)
    }
}

/// The recorder is shared with its interrupter, which kills it so the
/// pipe reaches end of stream.
struct CommandDevice {
    child: Arc<Mutex<Option<Child>>>,
    inner: ReaderCapture<ChildStdout>,
}

fn kill_recorder(child: &Mutex<Option<Child>>) -> io::Result<()> {
    let mut child = child.lock().unwrap_or_else(|p| p.into_inner());
    match child.as_mut().map(Child::kill) {
        // Already exited.
        Some(Err(e)) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Some(Err(e)) => Err(e),
        _ => Ok(()),
    }
}

fn take_recorder(child: &Mutex<Option<Child>>) -> Option<Child> {
    child.lock().unwrap_or_else(|p| p.into_inner()).take()
}

impl CaptureDevice for CommandDevice {
    fn start(&mut self) -> Result<(), StreamError> {
        self.inner.start()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        self.inner.read(buf)
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.inner.stop()?;
        kill_recorder(&self.child).map_err(|e| StreamError::Device(format!("kill recorder: {e}")))
    }

    fn release(&mut self) -> Result<(), StreamError> {
        self.inner.release()?;
        if let Some(mut child) = take_recorder(&self.child) {
            let status = child
                .wait()
                .map_err(|e| StreamError::Device(format!("reap recorder: {e}")))?;
            debug!("recorder exited: {status}");
        }
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let child = Arc::clone(&self.child);
        Some(Box::new(move || {
            if let Err(e) = kill_recorder(&child) {
                warn!("interrupt recorder: {e}");
            }
        }))
    }
}

impl Drop for CommandDevice {
    fn drop(&mut self) {
        if let Some(mut child) = take_recorder(&self.child) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

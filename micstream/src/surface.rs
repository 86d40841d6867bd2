//! The control surface: one touch channel and one audio streamer sharing
//! a configuration and a status queue.

use std::sync::Arc;

use tracing::{info, warn};

use micstream_core::config::StreamConfig;
use micstream_core::{
    AudioStreamer, CaptureSource, GestureTiming, PipelineSettings, PipelineState, ScreenMapper,
    StatusReporter, StatusSource, StreamError, StreamTarget, TouchChannel, TouchSurface,
    UdpConnector,
};

use crate::console::{AudioCommand, ConsoleCommand, HELP};

/// Whether the console loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ── ControlSurface ───────────────────────────────────────────────

/// Owns the head-unit connections for one run of the program.
///
/// Must be created inside a Tokio runtime.
pub struct ControlSurface {
    config: StreamConfig,
    touch: TouchChannel,
    pointer: TouchSurface,
    /// `None` only while a blocking stop is in flight.
    audio: Option<AudioStreamer>,
}

impl ControlSurface {
    pub fn new(
        config: StreamConfig,
        capture: Arc<dyn CaptureSource>,
        status: StatusReporter,
    ) -> Self {
        let binder = config.network.binder();
        let connector = UdpConnector::new(
            config.network.host.clone(),
            config.network.touch_port,
            binder.clone(),
        );
        let touch = TouchChannel::spawn(
            connector,
            GestureTiming::from(&config.touch),
            status.for_source(StatusSource::Touch),
        );
        let audio = AudioStreamer::new(
            capture,
            binder,
            PipelineSettings::from(&config.audio),
            status.for_source(StatusSource::Audio),
        );
        Self {
            pointer: TouchSurface::new(ScreenMapper::from(&config.touch)),
            config,
            touch,
            audio: Some(audio),
        }
    }

    pub fn touch(&self) -> &TouchChannel {
        &self.touch
    }

    /// Where audio datagrams are sent.
    pub fn audio_target(&self) -> StreamTarget {
        StreamTarget::new(self.config.network.host.clone(), self.config.network.audio_port)
    }

    pub fn audio_state(&self) -> PipelineState {
        self.audio
            .as_ref()
            .map(AudioStreamer::state)
            .unwrap_or(PipelineState::Stopping)
    }

    pub fn start_audio(&mut self) -> Result<(), StreamError> {
        let target = self.audio_target();
        let audio = self
            .audio
            .as_mut()
            .ok_or(StreamError::AlreadyRunning)?;
        audio.start(target)?;
        info!("audio session starting");
        Ok(())
    }

    /// Stop streaming without blocking the runtime.
    pub async fn stop_audio(&mut self) {
        let Some(mut audio) = self.audio.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || {
            audio.stop();
            audio
        })
        .await
        {
            Ok(audio) => self.audio = Some(audio),
            Err(e) => warn!("audio stop task failed: {e}"),
        }
    }

    /// Run one console command.
    pub async fn execute(&mut self, cmd: ConsoleCommand) -> Result<Flow, StreamError> {
        match cmd {
            ConsoleCommand::Tap { x, y } => self.touch.tap(x, y)?,
            ConsoleCommand::Swipe { from, to, steps } => self.touch.swipe(
                from.0,
                from.1,
                to.0,
                to.1,
                steps.unwrap_or(self.config.touch.swipe_steps),
            )?,
            ConsoleCommand::Pointer { phase, nx, ny } => {
                self.pointer.handle(&self.touch, phase, nx, ny)?;
            }
            ConsoleCommand::Action(action) => {
                action.perform(&self.touch, self.config.touch.swipe_steps)?
            }
            ConsoleCommand::Audio(AudioCommand::Start) => self.start_audio()?,
            ConsoleCommand::Audio(AudioCommand::Stop) => self.stop_audio().await,
            ConsoleCommand::Audio(AudioCommand::Status) => {
                println!("audio: {:?}", self.audio_state());
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Stop audio, then send whatever touch work is still queued.
    pub async fn shutdown(mut self) {
        self.stop_audio().await;
        self.touch.drain().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use micstream_core::{FileCapture, StatusEvent, TouchEvent, status_channel};
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    use super::*;
    use crate::console::parse_line;

    fn surface_for(
        touch_port: u16,
        audio_port: u16,
        pcm: &std::path::Path,
    ) -> (ControlSurface, mpsc::Receiver<StatusEvent>) {
        let mut config = StreamConfig::default();
        config.network.host = "127.0.0.1".into();
        config.network.touch_port = touch_port;
        config.network.audio_port = audio_port;
        config.network.pin_interface = false;
        config.touch.tap_hold_ms = 1;
        config.touch.swipe_step_ms = 1;
        config.touch.swipe_release_ms = 1;
        let (status, rx) = status_channel(StatusSource::Touch);
        let surface = ControlSurface::new(config, Arc::new(FileCapture::new(pcm)), status);
        (surface, rx)
    }

    async fn recv_event(socket: &UdpSocket) -> TouchEvent {
        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("timeout")
            .unwrap();
        TouchEvent::decode(&buf[..n]).unwrap()
    }

    #[tokio::test]
    async fn console_commands_reach_the_head_unit() {
        let touch_rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = touch_rx.local_addr().unwrap().port();
        let (mut surface, _status) = surface_for(port, 9, std::path::Path::new("/nonexistent"));

        for line in ["tap 3 4", "down 0.5 0.5", "back"] {
            let cmd = parse_line(line).unwrap().unwrap();
            assert_eq!(surface.execute(cmd).await.unwrap(), Flow::Continue);
        }

        assert_eq!(recv_event(&touch_rx).await, TouchEvent::press(3, 4));
        assert_eq!(recv_event(&touch_rx).await, TouchEvent::release(3, 4));
        assert_eq!(recv_event(&touch_rx).await, TouchEvent::press(512, 384));
        assert_eq!(recv_event(&touch_rx).await, TouchEvent::press(50, 740));
        assert_eq!(recv_event(&touch_rx).await, TouchEvent::release(50, 740));

        let quit = parse_line("quit").unwrap().unwrap();
        assert_eq!(surface.execute(quit).await.unwrap(), Flow::Quit);
        surface.shutdown().await;
    }

    #[tokio::test]
    async fn audio_start_and_stop_from_console() {
        let audio_rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let audio_port = audio_rx.local_addr().unwrap().port();
        let mut pcm = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut pcm, &[9u8; 1600]).unwrap();

        let (mut surface, mut status) = surface_for(9, audio_port, pcm.path());
        let start = parse_line("audio start").unwrap().unwrap();
        surface.execute(start).await.unwrap();

        let mut buf = [0u8; 2048];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), audio_rx.recv_from(&mut buf))
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(n, 1600);

        let first = tokio::time::timeout(Duration::from_secs(5), status.recv())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(first.source, StatusSource::Audio);
        assert!(first.connected);

        let stop = parse_line("audio stop").unwrap().unwrap();
        surface.execute(stop).await.unwrap();
        assert_eq!(surface.audio_state(), PipelineState::Idle);
        surface.shutdown().await;
    }
}

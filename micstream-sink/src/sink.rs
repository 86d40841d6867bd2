//! Receiver loop for the head-unit side of the link.
//!
//! Audio datagrams are appended verbatim to a writer (raw s16le PCM);
//! touch datagrams are decoded and logged. Malformed touch datagrams are
//! counted and skipped.

use std::future::Future;
use std::net::SocketAddr;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, warn};

use micstream_core::{StreamError, TouchCodec, TouchEvent};

/// Largest datagram we accept on the audio port.
const MAX_DATAGRAM: usize = 65_536;

/// Running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub audio_packets: u64,
    pub audio_bytes: u64,
    pub touch_events: u64,
    pub bad_touch: u64,
}

/// Both receive sockets of the head unit.
pub struct Sink {
    audio: UdpSocket,
    touch: UdpFramed<TouchCodec>,
    log_every: u64,
    stats: SinkStats,
}

impl Sink {
    /// Bind the audio and touch ports on `bind_ip`.
    pub async fn bind(
        bind_ip: &str,
        audio_port: u16,
        touch_port: u16,
        log_every: u64,
    ) -> Result<Self, StreamError> {
        let audio = UdpSocket::bind((bind_ip, audio_port)).await?;
        let touch = UdpSocket::bind((bind_ip, touch_port)).await?;
        info!("audio on {}", audio.local_addr()?);
        info!("touch on {}", touch.local_addr()?);
        Ok(Self {
            audio,
            touch: UdpFramed::new(touch, TouchCodec),
            log_every: log_every.max(1),
            stats: SinkStats::default(),
        })
    }

    pub fn audio_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.audio.local_addr()?)
    }

    pub fn touch_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.touch.get_ref().local_addr()?)
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Receive until `shutdown` completes, writing PCM to `out`.
    pub async fn run<W, F>(&mut self, out: &mut W, shutdown: F) -> Result<SinkStats, StreamError>
    where
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                res = self.audio.recv_from(&mut buf) => {
                    let (n, peer) = res?;
                    out.write_all(&buf[..n]).await?;
                    self.on_audio(n, peer);
                }

                item = self.touch.next() => match item {
                    Some(Ok((event, peer))) => self.on_touch(event, peer),
                    Some(Err(e)) => {
                        self.stats.bad_touch += 1;
                        warn!("dropping touch datagram: {e}");
                    }
                    None => break,
                },
            }
        }

        out.flush().await?;
        info!("sink stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    fn on_audio(&mut self, n: usize, peer: SocketAddr) {
        self.stats.audio_packets += 1;
        self.stats.audio_bytes += n as u64;
        if self.stats.audio_packets == 1 {
            info!("audio from {peer}");
        }
        if self.stats.audio_packets % self.log_every == 0 {
            info!(
                "audio: {} packets, {} bytes",
                self.stats.audio_packets, self.stats.audio_bytes
            );
        }
    }

    fn on_touch(&mut self, event: TouchEvent, peer: SocketAddr) {
        self.stats.touch_events += 1;
        if event.in_bounds() {
            info!("touch {event} from {peer}");
        } else {
            warn!("touch {event} from {peer} is off screen");
        }
        debug!("touch events so far: {}", self.stats.touch_events);
    }
}

// ── Tests ────────────────────────────────────────────────────────

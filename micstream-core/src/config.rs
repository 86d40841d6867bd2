//! Sender configuration loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binder::{TransportBinder, TransportClass};
use crate::error::StreamError;

/// Head-unit address used when none is configured.
pub const DEFAULT_HOST: &str = "192.168.254.1";
/// UDP port of the audio receiver.
pub const DEFAULT_AUDIO_PORT: u16 = 8000;
/// UDP port of the touch receiver.
pub const DEFAULT_TOUCH_PORT: u16 = 8001;
/// Smallest capture buffer handed to the device.
pub const MIN_DEVICE_BUFFER: usize = 3200;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Remote endpoint and routing.
    pub network: NetworkConfig,
    /// Microphone capture and framing.
    pub audio: AudioConfig,
    /// Touch gesture timing and screen geometry.
    pub touch: TouchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Head-unit host name or IP address.
    pub host: String,
    /// UDP port for PCM audio.
    pub audio_port: u16,
    /// UDP port for touch events.
    pub touch_port: u16,
    /// Pin sockets to an interface of `interface` class.
    pub pin_interface: bool,
    /// Transport class to pin to: "wifi", "ethernet", "cellular".
    pub interface: TransportClass,
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (mono, s16le).
    pub sample_rate: u32,
    /// Duration of one datagram in milliseconds.
    pub frame_ms: u32,
    /// Requested device-side buffer in bytes.
    pub device_buffer_bytes: usize,
    /// Emit a liveness status every N sent frames.
    pub status_every: u64,
    /// Upper bound on waiting for the worker at stop.
    pub join_timeout_ms: u64,
    /// Socket write timeout; 0 disables it.
    pub send_timeout_ms: u64,
    /// Recorder command producing raw s16le mono PCM on stdout.
    pub capture_command: Vec<String>,
}

/// Touch channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    pub screen_width: i16,
    pub screen_height: i16,
    /// Delay between Press and Release of a tap.
    pub tap_hold_ms: u64,
    /// Delay before each Move of a swipe.
    pub swipe_step_ms: u64,
    /// Delay between the last Move and the Release of a swipe.
    pub swipe_release_ms: u64,
    /// Interpolation steps for the scroll actions.
    pub swipe_steps: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            audio_port: DEFAULT_AUDIO_PORT,
            touch_port: DEFAULT_TOUCH_PORT,
            pin_interface: true,
            interface: TransportClass::Wifi,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_ms: 50,
            device_buffer_bytes: MIN_DEVICE_BUFFER,
            status_every: 200,
            join_timeout_ms: 3000,
            send_timeout_ms: 1000,
            capture_command: [
                "arecord", "-q", "-t", "raw", "-f", "S16_LE", "-r", "16000", "-c", "1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            screen_width: crate::codec::SCREEN_WIDTH,
            screen_height: crate::codec::SCREEN_HEIGHT,
            tap_hold_ms: 50,
            swipe_step_ms: 15,
            swipe_release_ms: 10,
            swipe_steps: 12,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Derived values ───────────────────────────────────────────────

impl AudioConfig {
    /// Bytes per frame: rate × 2 bytes × frame duration.
    pub fn frame_bytes(&self) -> usize {
        (self.sample_rate as usize * 2 * self.frame_ms as usize) / 1000
    }

    /// Device buffer: never below two frames or [`MIN_DEVICE_BUFFER`].
    pub fn device_buffer(&self) -> usize {
        self.device_buffer_bytes
            .max(2 * self.frame_bytes())
            .max(MIN_DEVICE_BUFFER)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }
}

impl TouchConfig {
    pub fn tap_hold(&self) -> Duration {
        Duration::from_millis(self.tap_hold_ms)
    }

    pub fn swipe_step(&self) -> Duration {
        Duration::from_millis(self.swipe_step_ms)
    }

    pub fn swipe_release(&self) -> Duration {
        Duration::from_millis(self.swipe_release_ms)
    }
}

impl NetworkConfig {
    /// Interface binder matching these settings.
    pub fn binder(&self) -> TransportBinder {
        if self.pin_interface {
            TransportBinder::new(self.interface)
        } else {
            TransportBinder::default_route()
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        let cfg: Self = toml::from_str(text).map_err(|e| StreamError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.audio.frame_bytes() == 0 {
            return Err(StreamError::Config("audio frame size is zero".into()));
        }
        if self.audio.status_every == 0 {
            return Err(StreamError::Config("audio.status_every must be > 0".into()));
        }
        if self.touch.screen_width <= 0 || self.touch.screen_height <= 0 {
            return Err(StreamError::Config("touch screen size must be positive".into()));
        }
        Ok(())
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&StreamConfig::default()).unwrap();
        assert!(text.contains("audio_port"));
        assert!(text.contains("capture_command"));
        assert!(text.contains("interface = \"wifi\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&StreamConfig::default()).unwrap();
        let parsed = StreamConfig::parse(&text).unwrap();
        assert_eq!(parsed.network.host, DEFAULT_HOST);
        assert_eq!(parsed.network.audio_port, 8000);
        assert_eq!(parsed.network.touch_port, 8001);
        assert_eq!(parsed.touch.screen_width, 1024);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = StreamConfig::parse("[network]\nhost = \"10.0.0.2\"\n").unwrap();
        assert_eq!(cfg.network.host, "10.0.0.2");
        assert_eq!(cfg.network.audio_port, DEFAULT_AUDIO_PORT);
        assert_eq!(cfg.audio.sample_rate, 16_000);
    }

    #[test]
    fn frame_sizing() {
        let audio = AudioConfig::default();
        assert_eq!(audio.frame_bytes(), 1600);
        assert_eq!(audio.device_buffer(), 3200);
    }

    #[test]
    fn device_buffer_never_below_floor() {
        let audio = AudioConfig {
            device_buffer_bytes: 256,
            ..Default::default()
        };
        assert_eq!(audio.device_buffer(), MIN_DEVICE_BUFFER);

        let audio = AudioConfig {
            sample_rate: 48_000,
            frame_ms: 100,
            ..Default::default()
        };
        assert_eq!(audio.device_buffer(), 2 * 9600);
    }

    #[test]
    fn zero_send_timeout_disables_it() {
        let audio = AudioConfig {
            send_timeout_ms: 0,
            ..Default::default()
        };
        assert!(audio.send_timeout().is_none());
    }

    #[test]
    fn validate_rejects_zero_status_interval() {
        let err = StreamConfig::parse("[audio]\nstatus_every = 0\n").unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
    }

    #[test]
    fn unknown_interface_is_rejected() {
        assert!(StreamConfig::parse("[network]\ninterface = \"carrier-pigeon\"\n").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = StreamConfig::load(Path::new("/nonexistent/micstream.toml"));
        assert_eq!(cfg.network.touch_port, DEFAULT_TOUCH_PORT);
    }
}

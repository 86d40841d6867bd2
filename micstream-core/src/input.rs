//! Local pointer input → remote touch events.
//!
//! The touch surface reports positions normalized to `0.0..=1.0`; they are
//! scaled to the remote screen and clamped so rounding never produces an
//! out-of-range coordinate.

use std::fmt;
use std::str::FromStr;

use crate::codec::{SCREEN_HEIGHT, SCREEN_WIDTH, TouchEvent, TouchKind};
use crate::config::TouchConfig;
use crate::error::StreamError;
use crate::touch::{Gesture, TouchChannel};

// ── ScreenMapper ─────────────────────────────────────────────────

/// Linear mapping from normalized coordinates to remote pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMapper {
    width: i16,
    height: i16,
}

impl ScreenMapper {
    pub fn new(width: i16, height: i16) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Map `(nx, ny)` in `0..=1` to `[0, width-1] × [0, height-1]`.
    pub fn map(&self, nx: f32, ny: f32) -> (i16, i16) {
        (scale(nx, self.width), scale(ny, self.height))
    }

    /// Map a pixel position on a local surface of `surface_w × surface_h`.
    pub fn map_pixels(&self, px: f32, py: f32, surface_w: f32, surface_h: f32) -> (i16, i16) {
        self.map(px / surface_w, py / surface_h)
    }
}

impl Default for ScreenMapper {
    fn default() -> Self {
        Self::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

impl From<&TouchConfig> for ScreenMapper {
    fn from(cfg: &TouchConfig) -> Self {
        Self::new(cfg.screen_width, cfg.screen_height)
    }
}

fn scale(n: f32, extent: i16) -> i16 {
    // `as` saturates and maps NaN to 0.
    let v = (n * extent as f32) as i32;
    v.clamp(0, extent as i32 - 1) as i16
}

// ── Pointer phases ───────────────────────────────────────────────

/// Phase of a local pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    /// The gesture was interrupted; treated like `Up`.
    Cancel,
}

impl From<PointerPhase> for TouchKind {
    fn from(phase: PointerPhase) -> Self {
        match phase {
            PointerPhase::Down => TouchKind::Press,
            PointerPhase::Move => TouchKind::Move,
            PointerPhase::Up | PointerPhase::Cancel => TouchKind::Release,
        }
    }
}

/// Turns pointer events into touch primitives.
#[derive(Debug, Clone, Default)]
pub struct TouchSurface {
    mapper: ScreenMapper,
    touching: bool,
}

impl TouchSurface {
    pub fn new(mapper: ScreenMapper) -> Self {
        Self {
            mapper,
            touching: false,
        }
    }

    /// Whether a pointer is currently down.
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Translate one pointer event.
    pub fn translate(&mut self, phase: PointerPhase, nx: f32, ny: f32) -> TouchEvent {
        self.touching = match phase {
            PointerPhase::Down => true,
            PointerPhase::Move => self.touching,
            PointerPhase::Up | PointerPhase::Cancel => false,
        };
        let (x, y) = self.mapper.map(nx, ny);
        TouchEvent::new(phase.into(), x, y)
    }

    /// Translate and queue on `channel`.
    pub fn handle(
        &mut self,
        channel: &TouchChannel,
        phase: PointerPhase,
        nx: f32,
        ny: f32,
    ) -> Result<TouchEvent, StreamError> {
        let ev = self.translate(phase, nx, ny);
        channel.send_primitive(ev.kind, ev.x, ev.y)?;
        Ok(ev)
    }
}

// ── RemoteAction ─────────────────────────────────────────────────

/// Shortcut buttons of the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    ScrollUp,
    ScrollDown,
    Home,
    Back,
}

impl RemoteAction {
    /// The gesture behind this button on a 1024×768 screen.
    pub fn gesture(&self, swipe_steps: u16) -> Gesture {
        match self {
            RemoteAction::ScrollUp => Gesture::Swipe {
                from: (512, 500),
                to: (512, 250),
                steps: swipe_steps,
            },
            RemoteAction::ScrollDown => Gesture::Swipe {
                from: (512, 250),
                to: (512, 500),
                steps: swipe_steps,
            },
            // Bottom-center of the launcher bar.
            RemoteAction::Home => Gesture::Tap { x: 512, y: 740 },
            // Bottom-left of the launcher bar.
            RemoteAction::Back => Gesture::Tap { x: 50, y: 740 },
        }
    }

    /// Queue the action's gesture on `channel`.
    pub fn perform(&self, channel: &TouchChannel, swipe_steps: u16) -> Result<(), StreamError> {
        channel.submit(self.gesture(swipe_steps))
    }
}

impl FromStr for RemoteAction {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scroll-up" | "up" => Ok(RemoteAction::ScrollUp),
            "scroll-down" | "down" => Ok(RemoteAction::ScrollDown),
            "home" => Ok(RemoteAction::Home),
            "back" => Ok(RemoteAction::Back),
            other => Err(StreamError::Other(format!("unknown action: {other}"))),
        }
    }
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAction::ScrollUp => write!(f, "scroll-up"),
            RemoteAction::ScrollDown => write!(f, "scroll-down"),
            RemoteAction::Home => write!(f, "home"),
            RemoteAction::Back => write!(f, "back"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_corners() {
        let m = ScreenMapper::default();
        assert_eq!(m.map(0.0, 0.0), (0, 0));
        assert_eq!(m.map(0.5, 0.5), (512, 384));
        assert_eq!(m.map(1.0, 1.0), (1023, 767));
    }

    #[test]
    fn out_of_range_is_clamped() {
        let m = ScreenMapper::default();
        for (nx, ny) in [
            (-0.01, -3.0),
            (1.0001, 1.2),
            (f32::INFINITY, f32::NEG_INFINITY),
            (f32::NAN, f32::NAN),
        ] {
            let (x, y) = m.map(nx, ny);
            assert!((0..1024).contains(&x), "x={x} for {nx}");
            assert!((0..768).contains(&y), "y={y} for {ny}");
        }
    }

    #[test]
    fn map_pixels_scales_surface() {
        let m = ScreenMapper::default();
        assert_eq!(m.map_pixels(540.0, 300.0, 1080.0, 600.0), (512, 384));
        // Zero-sized surface must still land on screen.
        let (x, y) = m.map_pixels(10.0, 10.0, 0.0, 0.0);
        assert_eq!((x, y), (1023, 767));
    }

    #[test]
    fn surface_translates_phases() {
        let mut s = TouchSurface::default();
        let down = s.translate(PointerPhase::Down, 0.25, 0.5);
        assert_eq!(down, TouchEvent::press(256, 384));
        assert!(s.is_touching());
        assert_eq!(s.translate(PointerPhase::Move, 0.5, 0.5).kind, TouchKind::Move);
        let cancel = s.translate(PointerPhase::Cancel, 0.5, 0.5);
        assert_eq!(cancel.kind, TouchKind::Release);
        assert!(!s.is_touching());
    }

    #[test]
    fn actions_parse_and_display() {
        for action in [
            RemoteAction::ScrollUp,
            RemoteAction::ScrollDown,
            RemoteAction::Home,
            RemoteAction::Back,
        ] {
            assert_eq!(action.to_string().parse::<RemoteAction>().unwrap(), action);
        }
        assert_eq!("HOME".parse::<RemoteAction>().unwrap(), RemoteAction::Home);
        assert!("sideways".parse::<RemoteAction>().is_err());
    }

    #[test]
    fn scroll_up_swipes_upwards() {
        match RemoteAction::ScrollUp.gesture(12) {
            Gesture::Swipe { from, to, steps } => {
                assert!(from.1 > to.1);
                assert_eq!(steps, 12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            RemoteAction::Home.gesture(12),
            Gesture::Tap { x: 512, y: 740 }
        );
    }
}

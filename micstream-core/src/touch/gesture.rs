//! Gesture synthesis: turning taps and swipes into timed primitive events.

use std::time::Duration;

use crate::codec::{SCREEN_HEIGHT, SCREEN_WIDTH, TouchEvent, TouchKind};
use crate::config::TouchConfig;

/// Delays used when expanding gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureTiming {
    /// Press → Release of a tap.
    pub tap_hold: Duration,
    /// Before each Move of a swipe.
    pub swipe_step: Duration,
    /// Last Move → Release of a swipe.
    pub swipe_release: Duration,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self::from(&TouchConfig::default())
    }
}

impl From<&TouchConfig> for GestureTiming {
    fn from(cfg: &TouchConfig) -> Self {
        Self {
            tap_hold: cfg.tap_hold(),
            swipe_step: cfg.swipe_step(),
            swipe_release: cfg.swipe_release(),
        }
    }
}

/// One event plus the pause that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureStep {
    pub delay: Duration,
    pub event: TouchEvent,
}

impl GestureStep {
    fn now(event: TouchEvent) -> Self {
        Self {
            delay: Duration::ZERO,
            event,
        }
    }

    fn after(delay: Duration, event: TouchEvent) -> Self {
        Self { delay, event }
    }
}

/// A unit of work for the touch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// A single event, sent as is.
    Primitive(TouchEvent),
    /// Press and Release at the same point.
    Tap { x: i16, y: i16 },
    /// Press at `from`, `steps` interpolated Moves, Release at `to`.
    Swipe {
        from: (i16, i16),
        to: (i16, i16),
        steps: u16,
    },
}

impl Gesture {
    pub fn primitive(kind: TouchKind, x: i16, y: i16) -> Self {
        Gesture::Primitive(TouchEvent::new(kind, x, y))
    }

    /// The same gesture with every point pulled onto the remote screen.
    pub fn clamped(self) -> Self {
        match self {
            Gesture::Primitive(event) => {
                let (x, y) = clamp_point((event.x, event.y));
                Gesture::Primitive(TouchEvent::new(event.kind, x, y))
            }
            Gesture::Tap { x, y } => {
                let (x, y) = clamp_point((x, y));
                Gesture::Tap { x, y }
            }
            Gesture::Swipe { from, to, steps } => Gesture::Swipe {
                from: clamp_point(from),
                to: clamp_point(to),
                steps,
            },
        }
    }

    /// Expand into the ordered list of events to send.
    pub fn plan(&self, timing: &GestureTiming) -> Vec<GestureStep> {
        match *self {
            Gesture::Primitive(event) => vec![GestureStep::now(event)],
            Gesture::Tap { x, y } => vec![
                GestureStep::now(TouchEvent::press(x, y)),
                GestureStep::after(timing.tap_hold, TouchEvent::release(x, y)),
            ],
            Gesture::Swipe { from, to, steps } => {
                let mut plan = Vec::with_capacity(steps as usize + 2);
                plan.push(GestureStep::now(TouchEvent::press(from.0, from.1)));
                for i in 1..=steps {
                    let x = interpolate(from.0, to.0, i, steps);
                    let y = interpolate(from.1, to.1, i, steps);
                    plan.push(GestureStep::after(timing.swipe_step, TouchEvent::move_to(x, y)));
                }
                plan.push(GestureStep::after(
                    timing.swipe_release,
                    TouchEvent::release(to.0, to.1),
                ));
                plan
            }
        }
    }
}

/// `a + (b - a) * i / steps` with truncating integer division.
fn interpolate(a: i16, b: i16, i: u16, steps: u16) -> i16 {
    let (a, b, i, steps) = (a as i64, b as i64, i as i64, steps as i64);
    // |b - a| * i fits easily in i64, and the result lies between a and b.
    (a + (b - a) * i / steps) as i16
}

fn clamp_point((x, y): (i16, i16)) -> (i16, i16) {
    (x.clamp(0, SCREEN_WIDTH - 1), y.clamp(0, SCREEN_HEIGHT - 1))
}

// ── Tests ────────────────────────────────────────────────────────

//! # micstream: head-unit control surface
//!
//! Sender side of the link: streams the microphone to the head unit and
//! turns console commands into remote touch gestures.
//!
//! ## Modes
//!
//! - **stream**: microphone only, until Ctrl-C.
//! - **tap / swipe / action**: one gesture, then exit.
//! - **console**: line-driven touch control, optionally with audio.

pub mod console;
pub mod surface;

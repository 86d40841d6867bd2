//! # micstream-sink: head-unit side receiver
//!
//! Debug stand-in for the head unit: binds the audio and touch ports,
//! saves the PCM stream and logs every decoded touch event.

pub mod sink;

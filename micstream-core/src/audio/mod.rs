//! Microphone → UDP streaming.
//!
//! | Module     | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | `device`   | Capture devices (`CaptureSource` / `CaptureDevice`)   |
//! | `pipeline` | Session state machine and the read → send worker      |
//! | `native`   | cpal host input, behind the `cpal` feature            |

pub mod device;
#[cfg(feature = "cpal")]
pub mod native;
pub mod pipeline;

pub use device::{
    CaptureDevice, CaptureParams, CaptureSource, CommandCapture, FileCapture, Interrupter,
    ReaderCapture, StdinCapture,
};
#[cfg(feature = "cpal")]
pub use native::CpalCapture;
pub use pipeline::{AudioStreamer, PipelineSettings, PipelineState, StreamTarget};

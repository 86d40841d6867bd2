//! Touch command channel: gesture synthesis and UDP delivery.
//!
//! | Module    | Purpose                                              |
//! |-----------|------------------------------------------------------|
//! | `gesture` | Expands taps and swipes into timed primitive events  |
//! | `link`    | Connection seam (`Connector` / `DatagramLink`) + UDP |
//! | `channel` | Queue + single worker with self-healing connection   |

pub mod channel;
pub mod gesture;
pub mod link;

pub use channel::TouchChannel;
pub use gesture::{Gesture, GestureStep, GestureTiming};
pub use link::{Connector, DatagramLink, UdpConnector, UdpLink};

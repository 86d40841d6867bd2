//! Touch-event wire format.
//!
//! ## Wire format
//!
//! One UDP datagram per event, 5 bytes, little-endian:
//!
//! ```text
//! kind:  u8   (1)   'D' press, 'M' move, 'U' release
//! x:     i16  (2)   0..SCREEN_WIDTH-1
//! y:     i16  (2)   0..SCREEN_HEIGHT-1
//! ```
//!
//! No length prefix, checksum or sequence number. The receiver treats
//! every datagram independently.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;

/// Remote screen width in pixels.
pub const SCREEN_WIDTH: i16 = 1024;
/// Remote screen height in pixels.
pub const SCREEN_HEIGHT: i16 = 768;

// ── TouchKind ────────────────────────────────────────────────────

/// Primitive touch action carried in byte 0 of every datagram.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchKind {
    Press = b'D',
    Move = b'M',
    Release = b'U',
}

impl TryFrom<u8> for TouchKind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'D' => Ok(TouchKind::Press),
            b'M' => Ok(TouchKind::Move),
            b'U' => Ok(TouchKind::Release),
            _ => Err(StreamError::UnknownVariant {
                type_name: "TouchKind",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for TouchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TouchKind::Press => write!(f, "Press"),
            TouchKind::Move => write!(f, "Move"),
            TouchKind::Release => write!(f, "Release"),
        }
    }
}

// ── TouchEvent ───────────────────────────────────────────────────

/// One absolute touch event in remote-screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: TouchKind,
    pub x: i16,
    pub y: i16,
}

impl TouchEvent {
    /// Encoded size on the wire.
    pub const SIZE: usize = 5;

    pub fn new(kind: TouchKind, x: i16, y: i16) -> Self {
        Self { kind, x, y }
    }

    pub fn press(x: i16, y: i16) -> Self {
        Self::new(TouchKind::Press, x, y)
    }

    pub fn move_to(x: i16, y: i16) -> Self {
        Self::new(TouchKind::Move, x, y)
    }

    pub fn release(x: i16, y: i16) -> Self {
        Self::new(TouchKind::Release, x, y)
    }

    /// Serialize to the 5-byte datagram payload.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.kind as u8;
        buf[1..3].copy_from_slice(&self.x.to_le_bytes());
        buf[3..5].copy_from_slice(&self.y.to_le_bytes());
        buf
    }

    /// Deserialize a datagram payload. The payload must be exactly
    /// [`SIZE`](Self::SIZE) bytes.
    pub fn decode(mut data: &[u8]) -> Result<Self, StreamError> {
        if data.len() != Self::SIZE {
            return Err(StreamError::InvalidPacketLength {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let kind = TouchKind::try_from(data.get_u8())?;
        let x = data.get_i16_le();
        let y = data.get_i16_le();
        Ok(Self { kind, x, y })
    }

    /// Whether both coordinates fall inside the remote screen.
    pub fn in_bounds(&self) -> bool {
        (0..SCREEN_WIDTH).contains(&self.x) && (0..SCREEN_HEIGHT).contains(&self.y)
    }
}

impl fmt::Display for TouchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.x, self.y)
    }
}

// ── TouchCodec ───────────────────────────────────────────────────

/// `tokio_util` codec for framing touch datagrams (used with `UdpFramed`).
///
/// Each datagram is handed to the decoder whole, so any trailing bytes
/// that don't form a complete event are discarded rather than carried
/// over into the next datagram.
#[derive(Debug, Default, Clone, Copy)]
pub struct TouchCodec;

impl Decoder for TouchCodec {
    type Item = TouchEvent;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let datagram = src.split_to(src.len());
        TouchEvent::decode(&datagram).map(Some)
    }
}

impl Encoder<TouchEvent> for TouchCodec {
    type Error = StreamError;

    fn encode(&mut self, item: TouchEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(TouchEvent::SIZE);
        dst.put_slice(&item.encode());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

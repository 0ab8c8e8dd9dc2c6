//! Raw timed packets and the sources that deliver them.
//!
//! A [`PacketSource`] abstracts a demultiplexed stream of overlay packets.
//! Sources never block: [`pull`](PacketSource::pull) returns `None` when no
//! packet is available *right now*, so a stalled overlay stream can never
//! hold up video presentation.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use overlaysync::{PacketQueue, PacketSource, RawPacket};
//!
//! let mut queue = PacketQueue::new();
//! assert!(queue.pull().is_none());
//!
//! queue.push(RawPacket::new(Duration::from_secs(1), b't', "Hello".as_bytes().to_vec()));
//! assert_eq!(queue.peek_timestamp(), Some(Duration::from_secs(1)));
//! assert!(queue.pull().is_some());
//! ```

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::error::OverlayError;
use crate::event::SourceKind;

/// Size of the header written by [`RawPacket::to_frame`].
pub const FRAME_HEADER_LEN: usize = 1 + 8 + 8 + 4;

/// Marker for "no duration" in framed packets.
const NO_DURATION: u64 = u64::MAX;

/// A timed packet as delivered by the demux layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Presentation timestamp of the packet.
    pub timestamp: Duration,
    /// Display duration, when the container knows it.
    pub duration: Option<Duration>,
    /// Subtitle type character (`t`, `m`, `a`, `v`, `d`).
    pub type_tag: u8,
    /// Packet payload.
    pub bytes: Vec<u8>,
}

impl RawPacket {
    /// Create a packet without a duration.
    pub fn new(timestamp: Duration, type_tag: u8, bytes: Vec<u8>) -> Self {
        Self {
            timestamp,
            duration: None,
            type_tag,
            bytes,
        }
    }

    /// Attach a display duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Resolve the type tag to a [`PacketKind`].
    ///
    /// # Errors
    ///
    /// [`OverlayError::UnknownSourceKind`] for tags no decoder handles.
    pub fn kind(&self) -> Result<PacketKind, OverlayError> {
        PacketKind::try_from(self.type_tag)
    }

    /// Parse a framed packet.
    ///
    /// Layout: type tag (1 byte), timestamp in microseconds (u64 BE),
    /// duration in microseconds (u64 BE, `u64::MAX` for none), payload
    /// length (u32 BE), payload.
    ///
    /// # Errors
    ///
    /// [`OverlayError::MalformedPacket`] if the header is truncated or the
    /// payload is shorter than announced.
    pub fn from_frame(frame: &[u8]) -> Result<Self, OverlayError> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(OverlayError::malformed(
                frame_kind(frame),
                format!(
                    "truncated header: {} of {FRAME_HEADER_LEN} bytes",
                    frame.len()
                ),
            ));
        }

        let type_tag = frame[0];
        let timestamp = read_u64(&frame[1..9]);
        let duration = read_u64(&frame[9..17]);
        let length = u32::from_be_bytes([frame[17], frame[18], frame[19], frame[20]]) as usize;

        let payload = &frame[FRAME_HEADER_LEN..];
        if payload.len() < length {
            return Err(OverlayError::malformed(
                frame_kind(frame),
                format!(
                    "payload truncated: {} of {length} bytes",
                    payload.len()
                ),
            ));
        }

        Ok(Self {
            timestamp: Duration::from_micros(timestamp),
            duration: (duration != NO_DURATION).then(|| Duration::from_micros(duration)),
            type_tag,
            bytes: payload[..length].to_vec(),
        })
    }

    /// Serialize into the framing understood by [`RawPacket::from_frame`].
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + self.bytes.len());
        frame.push(self.type_tag);
        frame.extend_from_slice(&(self.timestamp.as_micros() as u64).to_be_bytes());
        let duration = self
            .duration
            .map_or(NO_DURATION, |d| d.as_micros() as u64);
        frame.extend_from_slice(&duration.to_be_bytes());
        frame.extend_from_slice(&(self.bytes.len() as u32).to_be_bytes());
        frame.extend_from_slice(&self.bytes);
        frame
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(bytes);
    u64::from_be_bytes(buffer)
}

/// Best-effort kind for error reporting on a frame we cannot parse.
fn frame_kind(frame: &[u8]) -> SourceKind {
    frame
        .first()
        .and_then(|tag| PacketKind::try_from(*tag).ok())
        .map_or(SourceKind::PlainText, PacketKind::source_kind)
}

/// The decoder a packet is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// `t`: plain UTF-8 text.
    Text,
    /// `m`: text with a 16-bit big-endian length prefix.
    MovText,
    /// `a`: ASS/SSA dialogue data.
    Ass,
    /// `v`: DVD subpicture unit fragment.
    VobSub,
    /// `d`: DVB teletext PES payload.
    Teletext,
}

impl PacketKind {
    /// The type character used on the wire.
    pub fn type_tag(self) -> u8 {
        match self {
            PacketKind::Text => b't',
            PacketKind::MovText => b'm',
            PacketKind::Ass => b'a',
            PacketKind::VobSub => b'v',
            PacketKind::Teletext => b'd',
        }
    }

    /// The overlay kind produced by this packet type.
    pub fn source_kind(self) -> SourceKind {
        match self {
            PacketKind::Text | PacketKind::MovText => SourceKind::PlainText,
            PacketKind::Ass => SourceKind::StyledText,
            PacketKind::VobSub => SourceKind::Bitmap,
            PacketKind::Teletext => SourceKind::Teletext,
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = OverlayError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            b't' => Ok(PacketKind::Text),
            b'm' => Ok(PacketKind::MovText),
            b'a' => Ok(PacketKind::Ass),
            b'v' => Ok(PacketKind::VobSub),
            b'd' => Ok(PacketKind::Teletext),
            other => Err(OverlayError::UnknownSourceKind(other)),
        }
    }
}

impl Display for PacketKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.type_tag() as char)
    }
}

/// A non-blocking supplier of timed overlay packets.
///
/// Implementations must return promptly from every method. `None` from
/// [`pull`](PacketSource::pull) means "nothing available now"; the engine
/// will ask again on the next tick.
pub trait PacketSource {
    /// Take the next available packet, if any.
    fn pull(&mut self) -> Option<RawPacket>;

    /// Timestamp of the packet [`pull`](PacketSource::pull) would return,
    /// without consuming it.
    fn peek_timestamp(&mut self) -> Option<Duration>;

    /// Reposition after a presentation discontinuity.
    ///
    /// Sources that cannot seek (live demuxers) ignore this.
    fn seek(&mut self, _position: Duration) {}
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn pull(&mut self) -> Option<RawPacket> {
        (**self).pull()
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        (**self).peek_timestamp()
    }

    fn seek(&mut self, position: Duration) {
        (**self).seek(position)
    }
}

/// An in-memory FIFO of packets, fed by the host's demuxer.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: VecDeque<RawPacket>,
    dropped: u64,
}

impl PacketQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet.
    pub fn push(&mut self, packet: RawPacket) {
        self.packets.push_back(packet);
    }

    /// Decode and append a framed packet.
    ///
    /// A malformed frame is dropped with a warning; the queue stays usable.
    ///
    /// # Errors
    ///
    /// Returns the [`OverlayError::MalformedPacket`] describing the drop.
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<(), OverlayError> {
        match RawPacket::from_frame(frame) {
            Ok(packet) => {
                self.push(packet);
                Ok(())
            }
            Err(error) => {
                self.dropped += 1;
                log::warn!("Dropping framed packet: {error}");
                Err(error)
            }
        }
    }

    /// Number of packets waiting.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether no packet is waiting.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Number of frames dropped by [`push_frame`](PacketQueue::push_frame).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard everything that is queued.
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

impl PacketSource for PacketQueue {
    fn pull(&mut self) -> Option<RawPacket> {
        self.packets.pop_front()
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        self.packets.front().map(|packet| packet.timestamp)
    }
}

impl Extend<RawPacket> for PacketQueue {
    fn extend<T: IntoIterator<Item = RawPacket>>(&mut self, iter: T) {
        self.packets.extend(iter);
    }
}

impl FromIterator<RawPacket> for PacketQueue {
    fn from_iter<T: IntoIterator<Item = RawPacket>>(iter: T) -> Self {
        Self {
            packets: iter.into_iter().collect(),
            dropped: 0,
        }
    }
}

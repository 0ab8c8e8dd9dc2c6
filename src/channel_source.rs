//! Packet sources fed across threads through a tokio channel.
//!
//! Demuxing often runs on its own task. [`ChannelPacketSource`] is the
//! receiving end of a bounded `mpsc` channel; it never waits, so a demuxer
//! that falls behind only delays overlays, never video.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use overlaysync::{EngineOptions, OverlayEngine, RawPacket, packet_channel};
//!
//! # async fn example() -> Result<(), overlaysync::OverlayError> {
//! let (sender, source) = packet_channel(32);
//! let mut engine = OverlayEngine::new(EngineOptions::default())?;
//! engine.attach_source(source);
//!
//! tokio::spawn(async move {
//!     let packet = RawPacket::new(Duration::from_secs(1), b't', b"Hello".to_vec());
//!     let _ = sender.send(packet).await;
//! });
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

use crate::packet::{PacketSource, RawPacket};

/// Default bounded-channel capacity for [`packet_channel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Receiving end of a packet channel.
#[derive(Debug)]
pub struct ChannelPacketSource {
    receiver: Receiver<RawPacket>,
    /// One packet taken off the channel to answer `peek_timestamp`.
    buffered: Option<RawPacket>,
    disconnected: bool,
}

/// Create a bounded packet channel. A capacity of zero is raised to one.
pub fn packet_channel(capacity: usize) -> (Sender<RawPacket>, ChannelPacketSource) {
    let (sender, receiver) = tokio::sync::mpsc::channel(capacity.max(1));
    (
        sender,
        ChannelPacketSource {
            receiver,
            buffered: None,
            disconnected: false,
        },
    )
}

/// Drain a blocking packet source on a blocking thread into a channel.
///
/// The feeder stops when the source is exhausted or the receiving end is
/// dropped. Must be called from within a tokio runtime.
pub fn spawn_feeder<S>(mut source: S, capacity: usize) -> (ChannelPacketSource, JoinHandle<()>)
where
    S: PacketSource + Send + 'static,
{
    let (sender, receiver) = packet_channel(capacity);
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(packet) = source.pull() {
            if sender.blocking_send(packet).is_err() {
                log::debug!("Packet channel closed, stopping feeder");
                break;
            }
        }
    });
    (receiver, handle)
}

impl ChannelPacketSource {
    /// Whether every sender has been dropped and nothing is left to read.
    pub fn is_finished(&self) -> bool {
        self.disconnected && self.buffered.is_none()
    }

    fn fill(&mut self) {
        if self.buffered.is_some() || self.disconnected {
            return;
        }
        match self.receiver.try_recv() {
            Ok(packet) => self.buffered = Some(packet),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                log::debug!("Packet channel disconnected");
                self.disconnected = true;
            }
        }
    }
}

impl PacketSource for ChannelPacketSource {
    fn pull(&mut self) -> Option<RawPacket> {
        self.fill();
        self.buffered.take()
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        self.fill();
        self.buffered.as_ref().map(|packet| packet.timestamp)
    }

    fn seek(&mut self, _position: Duration) {
        // Read-ahead belongs to the old position.
        self.buffered = None;
    }
}

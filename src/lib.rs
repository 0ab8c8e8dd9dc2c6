//! # overlaysync
//!
//! Synchronize subtitle and overlay streams against a video presentation
//! clock.
//!
//! `overlaysync` ingests heterogeneous timed overlay sources (plain-text
//! subtitles, ASS/SSA styled subtitles, DVD bitmap subpictures, DVB
//! teletext pages and external SRT/WebVTT files) and produces a single
//! time-consistent, immutable on-screen-display snapshot for a renderer.
//!
//! ## Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use overlaysync::{EngineOptions, ManualClock, OverlayEngine, SlotKind, SubtitleFileSource};
//!
//! let source = SubtitleFileSource::parse("1\n00:00:01,000 --> 00:00:03,000\nHello there\n")?;
//!
//! let mut engine = OverlayEngine::new(EngineOptions::default())?;
//! engine.attach_source(source);
//!
//! let clock = ManualClock::new(Duration::from_secs(2));
//! let report = engine.tick(&clock);
//! assert!(report.changed);
//! assert_eq!(
//!     report.snapshot.lines(SlotKind::Subtitle),
//!     Some(&["Hello there".to_string()][..])
//! );
//! # Ok::<(), overlaysync::OverlayError>(())
//! ```
//!
//! ## Pipeline
//!
//! - **Packet sources** ([`PacketSource`]) deliver raw timed packets and
//!   never block.
//! - **Decoders** ([`DecoderSet`]) turn packets into [`OverlayEvent`]s,
//!   clear signals and [`Subpicture`]s.
//! - The **reconciler** ([`TimelineReconciler`]) keeps at most one event
//!   per display slot, handling supersession, expiry, fragment merging and
//!   resets.
//! - The **clock coordinator** ([`ClockCoordinator`]) turns seeks into
//!   full resets.
//! - The **bitmap lifecycle** ([`BitmapLifecycle`]) applies subpicture
//!   show/hide commands on heartbeat.
//! - The **publisher** ([`OsdPublisher`]) emits a new [`OsdSnapshot`] only
//!   when something actually changed.
//!
//! [`OverlayEngine`] owns all of them and runs them in a fixed order on
//! every [`tick`](OverlayEngine::tick).
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `ChannelPacketSource` for feeding packets from another task via Tokio |
//! | `ffmpeg` | `FfmpegSubtitleSource` for reading subtitle streams of media files |
//! | `full` | Enables all of the above |

pub mod bitmap_lifecycle;
#[cfg(feature = "async")]
pub mod channel_source;
pub mod clock;
pub mod configuration;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod event;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod packet;
pub mod publisher;
pub mod reconciler;
pub mod redraw;
pub mod styled;
pub mod subpicture;
pub mod subtitle_file;
pub mod teletext;
pub mod text;
mod utilities;

pub use bitmap_lifecycle::BitmapLifecycle;
#[cfg(feature = "async")]
pub use channel_source::{ChannelPacketSource, packet_channel, spawn_feeder};
pub use clock::{ClockCoordinator, ClockObservation, ManualClock, PresentationClock};
pub use configuration::{EngineOptions, UnknownEndPolicy};
pub use decoder::{Decoded, DecoderSet};
pub use engine::{OverlayEngine, SourceId, TickReport};
pub use error::OverlayError;
pub use event::{
    EndTime, OverlayEvent, OverlayRect, PaletteEntry, RenderableOverlay, SequenceId, SlotKind,
    SourceKind, StyleHints,
};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, FfmpegSubtitleSource, set_ffmpeg_log_level};
pub use packet::{PacketKind, PacketQueue, PacketSource, RawPacket};
pub use publisher::{OsdPublisher, OsdSnapshot};
pub use reconciler::{ActiveOverlaySet, IngestOutcome, SlotState, TimelineReconciler};
pub use redraw::{EngineStats, RedrawCallback};
pub use styled::StyledTextDecoder;
pub use subpicture::{
    Subpicture, SubpictureAction, SubpictureAssembler, SubpictureCommand, SubpictureImage,
};
pub use subtitle_file::{
    SubtitleCue, SubtitleFileSource, SubtitleFormat, format_subtitles, parse_subtitles,
};
pub use teletext::TeletextDecoder;
pub use text::{PlainTextDecoder, TextFraming};

//! Subtitle packets read from media files through FFmpeg.
//!
//! [`FfmpegSubtitleSource`] demuxes one subtitle stream of a media file and
//! hands its packets to the engine undecoded, tagged with the type
//! character of the stream's codec. The module also wraps FFmpeg's own
//! log-level API so hosts can silence FFmpeg's console output without
//! importing `ffmpeg-next` directly.
//!
//! # Example
//!
//! ```no_run
//! use overlaysync::{EngineOptions, FfmpegLogLevel, FfmpegSubtitleSource, OverlayEngine};
//!
//! overlaysync::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//!
//! let source = FfmpegSubtitleSource::open("input.mkv")?;
//! let mut engine = OverlayEngine::new(EngineOptions::default())?;
//! engine.attach_source(source);
//! # Ok::<(), overlaysync::OverlayError>(())
//! ```
//!
//! # Note
//!
//! The log level controls **FFmpeg's own console output**, not the
//! Rust-side diagnostic messages emitted via the `log` crate.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::media::Type;
use ffmpeg_next::util::log::Level;
use ffmpeg_next::{Error as FfmpegError, Packet, Rational};

use crate::error::OverlayError;
use crate::packet::{PacketKind, PacketSource, RawPacket};

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log unrecoverable errors that abort the process.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (default FFmpeg level).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Map a subtitle codec to the packet type it is decoded as.
pub fn packet_kind_for_codec(id: Id) -> Option<PacketKind> {
    match id {
        Id::SUBRIP | Id::SRT | Id::TEXT | Id::WEBVTT => Some(PacketKind::Text),
        Id::MOV_TEXT => Some(PacketKind::MovText),
        Id::ASS | Id::SSA => Some(PacketKind::Ass),
        Id::DVD_SUBTITLE => Some(PacketKind::VobSub),
        Id::DVB_TELETEXT => Some(PacketKind::Teletext),
        _ => None,
    }
}

/// A [`PacketSource`] over one subtitle stream of a media file.
///
/// Reading ahead to the next subtitle packet happens inside
/// [`peek_timestamp`](PacketSource::peek_timestamp); it reads from the
/// local file and never waits on the network.
pub struct FfmpegSubtitleSource {
    input_context: Input,
    stream_index: usize,
    time_base: Rational,
    kind: PacketKind,
    buffered: Option<RawPacket>,
    exhausted: bool,
}

impl Debug for FfmpegSubtitleSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegSubtitleSource")
            .field("stream_index", &self.stream_index)
            .field("kind", &self.kind)
            .field("has_buffered", &self.buffered.is_some())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl FfmpegSubtitleSource {
    /// Open the best subtitle stream of a media file.
    ///
    /// # Errors
    ///
    /// [`OverlayError::FfmpegError`] if the file cannot be opened, or
    /// [`OverlayError::NoSubtitleStream`] if it has no supported subtitle
    /// stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OverlayError> {
        Self::open_stream(path, None)
    }

    /// Open a specific subtitle stream by its container stream index.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_stream<P: AsRef<Path>>(
        path: P,
        stream_index: Option<usize>,
    ) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        log::debug!("Opening subtitle stream of {}", path.display());

        ffmpeg_next::init()?;
        let input_context = ffmpeg_next::format::input(&path)?;

        let stream = match stream_index {
            Some(index) => input_context.stream(index),
            None => input_context.streams().best(Type::Subtitle),
        }
        .filter(|stream| stream.parameters().medium() == Type::Subtitle)
        .ok_or(OverlayError::NoSubtitleStream)?;

        let codec_id = stream.parameters().id();
        let kind = packet_kind_for_codec(codec_id).ok_or(OverlayError::NoSubtitleStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        log::debug!("Using subtitle stream {stream_index} ({codec_id:?} as {kind})");

        Ok(Self {
            input_context,
            stream_index,
            time_base,
            kind,
            buffered: None,
            exhausted: false,
        })
    }

    /// The container index of the stream being read.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// The packet type this stream is decoded as.
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    fn to_duration(&self, ticks: i64) -> Duration {
        let seconds = ticks.max(0) as f64 * self.time_base.numerator() as f64
            / self.time_base.denominator().max(1) as f64;
        Duration::from_secs_f64(seconds)
    }

    fn fill(&mut self) {
        while self.buffered.is_none() && !self.exhausted {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    let Some(data) = packet.data() else {
                        continue;
                    };

                    let timestamp = self.to_duration(packet.pts().or(packet.dts()).unwrap_or(0));
                    let mut raw = RawPacket::new(timestamp, self.kind.type_tag(), data.to_vec());
                    if packet.duration() > 0 {
                        raw = raw.with_duration(self.to_duration(packet.duration()));
                    }
                    self.buffered = Some(raw);
                }
                Err(FfmpegError::Eof) => {
                    log::debug!("Subtitle stream {} exhausted", self.stream_index);
                    self.exhausted = true;
                }
                Err(error) => {
                    log::warn!("Stopping subtitle stream {} after read error: {error}", self.stream_index);
                    self.exhausted = true;
                }
            }
        }
    }
}

impl PacketSource for FfmpegSubtitleSource {
    fn pull(&mut self) -> Option<RawPacket> {
        self.fill();
        self.buffered.take()
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        self.fill();
        self.buffered.as_ref().map(|packet| packet.timestamp)
    }

    fn seek(&mut self, position: Duration) {
        let timestamp = position.as_micros() as i64;
        if let Err(error) = self.input_context.seek(timestamp, ..timestamp) {
            log::warn!("Subtitle seek to {position:?} failed: {error}");
            return;
        }
        self.buffered = None;
        self.exhausted = false;
    }
}

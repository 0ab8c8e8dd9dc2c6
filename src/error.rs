//! Error types for the `overlaysync` crate.
//!
//! This module defines [`OverlayError`], the unified error type returned by
//! every fallible operation in the crate. None of these conditions is fatal
//! to playback: the engine logs and counts decode errors and carries on with
//! the next packet.

use std::io::Error as IoError;

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::event::SourceKind;

/// The unified error type for all `overlaysync` operations.
///
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OverlayError {
    /// A packet could not be decoded (truncated header, inconsistent
    /// offsets, missing fields). The packet is dropped.
    #[error("Malformed {kind} packet: {reason}")]
    MalformedPacket {
        /// The overlay kind the packet was routed to.
        kind: SourceKind,
        /// What was wrong with it.
        reason: String,
    },

    /// A packet carried a type tag that no decoder understands.
    #[error("Unknown overlay source type tag 0x{0:02x}")]
    UnknownSourceKind(u8),

    /// A subtitle file could not be parsed.
    #[error("Subtitle parse error at line {line}: {reason}")]
    SubtitleParse {
        /// One-based line number in the input.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// An [`EngineOptions`](crate::EngineOptions) value is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An I/O error occurred while reading a subtitle file.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// The media file does not contain a subtitle stream.
    #[cfg(feature = "ffmpeg")]
    #[error("No subtitle stream found in file")]
    NoSubtitleStream,

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl OverlayError {
    /// Shorthand for building a [`OverlayError::MalformedPacket`].
    pub(crate) fn malformed(kind: SourceKind, reason: impl Into<String>) -> Self {
        OverlayError::MalformedPacket {
            kind,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<FfmpegError> for OverlayError {
    fn from(error: FfmpegError) -> Self {
        OverlayError::FfmpegError(error.to_string())
    }
}

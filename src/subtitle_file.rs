//! Externally supplied subtitle files.
//!
//! This module parses SubRip (`.srt`) and WebVTT (`.vtt`) files into
//! [`SubtitleCue`]s and serves them to the engine as plain-text packets
//! through [`SubtitleFileSource`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use overlaysync::{PacketSource, SubtitleFileSource};
//!
//! let mut source = SubtitleFileSource::parse(
//!     "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n",
//! )?;
//! assert_eq!(source.len(), 2);
//! assert_eq!(source.peek_timestamp(), Some(Duration::from_secs(1)));
//! # Ok::<(), overlaysync::OverlayError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use crate::error::OverlayError;
use crate::packet::{PacketKind, PacketSource, RawPacket};
use crate::utilities::{format_srt_timestamp, format_vtt_timestamp, parse_timestamp};

const WEBVTT_SIGNATURE: &str = "WEBVTT";
const TIMING_SEPARATOR: &str = "-->";

/// A single subtitle cue with timing and text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    /// When this cue starts displaying.
    pub start_time: Duration,
    /// When this cue stops displaying.
    pub end_time: Duration,
    /// The cue text; lines are separated by `\n`.
    pub text: String,
    /// The zero-based index of this cue in start-time order.
    pub index: usize,
}

/// Subtitle file formats understood for reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    /// SubRip Text (.srt).
    Srt,
    /// Web Video Text Tracks (.vtt).
    WebVtt,
    /// Raw text, one entry per line with timestamps. Write-only.
    Raw,
}

impl SubtitleFormat {
    /// Guess the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "srt" => Some(SubtitleFormat::Srt),
            "vtt" => Some(SubtitleFormat::WebVtt),
            "txt" => Some(SubtitleFormat::Raw),
            _ => None,
        }
    }
}

impl Display for SubtitleFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SubtitleFormat::Srt => write!(f, "SRT"),
            SubtitleFormat::WebVtt => write!(f, "WebVTT"),
            SubtitleFormat::Raw => write!(f, "Raw"),
        }
    }
}

/// Parse an SRT or WebVTT document.
///
/// WebVTT is recognised by its `WEBVTT` signature; anything else is read
/// as SRT. Cues are returned sorted by start time.
///
/// # Errors
///
/// [`OverlayError::SubtitleParse`] for a malformed timing line, a cue that
/// ends before it starts, or a block without a timing line.
pub fn parse_subtitles(input: &str) -> Result<Vec<SubtitleCue>, OverlayError> {
    let input = input.trim_start_matches('\u{feff}');
    let webvtt = input.starts_with(WEBVTT_SIGNATURE);

    let mut cues = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (number, line) in input.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !block.is_empty() {
                parse_block(&block, webvtt, &mut cues)?;
                block.clear();
            }
        } else {
            block.push((number + 1, line));
        }
    }
    if !block.is_empty() {
        parse_block(&block, webvtt, &mut cues)?;
    }

    cues.sort_by_key(|cue: &SubtitleCue| cue.start_time);
    for (index, cue) in cues.iter_mut().enumerate() {
        cue.index = index;
    }

    log::debug!(
        "Parsed {} {} cues",
        cues.len(),
        if webvtt {
            SubtitleFormat::WebVtt
        } else {
            SubtitleFormat::Srt
        }
    );
    Ok(cues)
}

fn parse_block(
    block: &[(usize, &str)],
    webvtt: bool,
    cues: &mut Vec<SubtitleCue>,
) -> Result<(), OverlayError> {
    let (first_line, first) = block[0];
    if webvtt
        && (first.starts_with(WEBVTT_SIGNATURE)
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION"))
    {
        return Ok(());
    }

    let Some(timing_position) = block
        .iter()
        .position(|(_, line)| line.contains(TIMING_SEPARATOR))
    else {
        return Err(OverlayError::SubtitleParse {
            line: first_line,
            reason: "cue has no timing line".to_string(),
        });
    };

    let (line_number, timing) = block[timing_position];
    let (start_time, end_time) = parse_timing(timing, line_number)?;

    let text = block[timing_position + 1..]
        .iter()
        .map(|(_, line)| line.trim())
        .collect::<Vec<_>>()
        .join("\n");

    cues.push(SubtitleCue {
        start_time,
        end_time,
        text,
        index: cues.len(),
    });
    Ok(())
}

fn parse_timing(timing: &str, line: usize) -> Result<(Duration, Duration), OverlayError> {
    let parse_error = |reason: String| OverlayError::SubtitleParse { line, reason };

    let (start, rest) = timing
        .split_once(TIMING_SEPARATOR)
        .ok_or_else(|| parse_error("missing -->".to_string()))?;
    // WebVTT cue settings follow the end timestamp.
    let end = rest.split_whitespace().next().unwrap_or_default();

    let start_time = parse_timestamp(start)
        .ok_or_else(|| parse_error(format!("invalid start timestamp {:?}", start.trim())))?;
    let end_time =
        parse_timestamp(end).ok_or_else(|| parse_error(format!("invalid end timestamp {end:?}")))?;

    if end_time < start_time {
        return Err(parse_error(format!(
            "cue ends ({end_time:?}) before it starts ({start_time:?})"
        )));
    }

    Ok((start_time, end_time))
}

/// Format cues into a string in the given format.
pub fn format_subtitles(cues: &[SubtitleCue], format: SubtitleFormat) -> String {
    let mut output = String::new();

    match format {
        SubtitleFormat::Srt => {
            for (i, cue) in cues.iter().enumerate() {
                output.push_str(&format!(
                    "{}\n{} --> {}\n{}\n\n",
                    i + 1,
                    format_srt_timestamp(cue.start_time),
                    format_srt_timestamp(cue.end_time),
                    cue.text
                ));
            }
        }
        SubtitleFormat::WebVtt => {
            output.push_str("WEBVTT\n\n");
            for (i, cue) in cues.iter().enumerate() {
                output.push_str(&format!(
                    "{}\n{} --> {}\n{}\n\n",
                    i + 1,
                    format_vtt_timestamp(cue.start_time),
                    format_vtt_timestamp(cue.end_time),
                    cue.text
                ));
            }
        }
        SubtitleFormat::Raw => {
            for cue in cues {
                output.push_str(&format!(
                    "[{:?} → {:?}] {}\n",
                    cue.start_time,
                    cue.end_time,
                    cue.text.replace('\n', " / ")
                ));
            }
        }
    }

    output
}

/// Serves the cues of a subtitle file as plain-text packets.
///
/// Each cue becomes one `t` packet whose duration is the cue length.
/// Seeking repositions to the first cue still visible at the target.
#[derive(Debug, Clone, Default)]
pub struct SubtitleFileSource {
    cues: Vec<SubtitleCue>,
    position: usize,
}

impl SubtitleFileSource {
    /// Wrap already parsed cues. They are sorted by start time.
    pub fn from_cues(mut cues: Vec<SubtitleCue>) -> Self {
        cues.sort_by_key(|cue| cue.start_time);
        Self { cues, position: 0 }
    }

    /// Parse SRT or WebVTT text.
    ///
    /// # Errors
    ///
    /// See [`parse_subtitles`].
    pub fn parse(input: &str) -> Result<Self, OverlayError> {
        Ok(Self::from_cues(parse_subtitles(input)?))
    }

    /// Read and parse a subtitle file.
    ///
    /// # Errors
    ///
    /// [`OverlayError::IoError`] if the file cannot be read, or the errors
    /// of [`parse_subtitles`]. Invalid UTF-8 is replaced rather than
    /// rejected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        log::debug!("Opening subtitle file {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// All cues, in start-time order.
    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    /// Number of cues.
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Whether the file had no cues.
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Number of cues not yet pulled.
    pub fn remaining(&self) -> usize {
        self.cues.len() - self.position
    }

    /// Cues whose text contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&SubtitleCue> {
        let query_lower = query.to_lowercase();
        self.cues
            .iter()
            .filter(|cue| cue.text.to_lowercase().contains(&query_lower))
            .collect()
    }
}

impl PacketSource for SubtitleFileSource {
    fn pull(&mut self) -> Option<RawPacket> {
        let cue = self.cues.get(self.position)?;
        self.position += 1;
        Some(
            RawPacket::new(
                cue.start_time,
                PacketKind::Text.type_tag(),
                cue.text.clone().into_bytes(),
            )
            .with_duration(cue.end_time - cue.start_time),
        )
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        self.cues.get(self.position).map(|cue| cue.start_time)
    }

    fn seek(&mut self, position: Duration) {
        self.position = self
            .cues
            .iter()
            .position(|cue| cue.end_time > position)
            .unwrap_or(self.cues.len());
        log::trace!("Subtitle file seeked to cue {}", self.position);
    }
}

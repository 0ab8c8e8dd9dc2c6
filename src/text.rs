//! Plain-text subtitle decoding.
//!
//! Handles SubRip-style text packets (`t`) and length-prefixed MOV text
//! packets (`m`). Each packet becomes one caption; an empty packet is an
//! explicit "end of caption" signal.

use crate::configuration::UnknownEndPolicy;
use crate::decoder::Decoded;
use crate::error::OverlayError;
use crate::event::{EndTime, OverlayEvent, RenderableOverlay, SequenceId, SourceKind, StyleHints};
use crate::packet::RawPacket;

/// How the text is framed inside the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFraming {
    /// The whole payload is text.
    Raw,
    /// A 16-bit big-endian length precedes the text.
    LengthPrefixed,
}

/// Decoder for plain-text subtitle packets.
#[derive(Debug)]
pub struct PlainTextDecoder {
    next_caption: u64,
    max_lines: usize,
    unknown_end: UnknownEndPolicy,
}

impl PlainTextDecoder {
    /// Create a decoder.
    pub fn new(max_lines: usize, unknown_end: UnknownEndPolicy) -> Self {
        Self {
            next_caption: 1,
            max_lines: max_lines.max(1),
            unknown_end,
        }
    }

    /// Decode one packet.
    ///
    /// # Errors
    ///
    /// [`OverlayError::MalformedPacket`] if a length-prefixed packet is
    /// shorter than its prefix.
    pub fn decode(
        &mut self,
        packet: &RawPacket,
        framing: TextFraming,
    ) -> Result<Vec<Decoded>, OverlayError> {
        let payload = match framing {
            TextFraming::Raw => packet.bytes.as_slice(),
            TextFraming::LengthPrefixed => {
                if packet.bytes.len() < 2 {
                    return Err(OverlayError::malformed(
                        SourceKind::PlainText,
                        "length prefix truncated",
                    ));
                }
                let declared = u16::from_be_bytes([packet.bytes[0], packet.bytes[1]]) as usize;
                let available = packet.bytes.len() - 2;
                &packet.bytes[2..2 + declared.min(available)]
            }
        };

        let raw_text = String::from_utf8_lossy(payload);
        let (lines, style_hints) = split_markup(raw_text.trim_end_matches('\0'), self.max_lines);

        if lines.is_empty() {
            log::trace!("Plain text clear at {:?}", packet.timestamp);
            return Ok(vec![Decoded::Clear {
                kind: SourceKind::PlainText,
                at: packet.timestamp,
            }]);
        }

        let end_time = match (packet.duration, self.unknown_end) {
            (Some(duration), _) => EndTime::At(packet.timestamp.saturating_add(duration)),
            (None, UnknownEndPolicy::Fixed(duration)) => EndTime::At(packet.timestamp.saturating_add(duration)),
            (None, UnknownEndPolicy::UntilCleared) => EndTime::Unknown,
        };

        let sequence_id = SequenceId::new(self.next_caption);
        self.next_caption += 1;

        Ok(vec![Decoded::Overlay(OverlayEvent {
            source_kind: SourceKind::PlainText,
            payload: RenderableOverlay::Text { lines, style_hints },
            start_time: packet.timestamp,
            end_time,
            sequence_id,
        })])
    }

    /// The next caption number this decoder will hand out.
    pub fn next_caption(&self) -> u64 {
        self.next_caption
    }

    /// Set the fallback end time for later packets.
    pub fn set_unknown_end(&mut self, policy: UnknownEndPolicy) {
        self.unknown_end = policy;
    }
}

/// Strip HTML-like tags and `{...}` override blocks, collect hints, and
/// split into non-blank display lines.
pub(crate) fn split_markup(text: &str, max_lines: usize) -> (Vec<String>, StyleHints) {
    let mut hints = StyleHints::default();
    let mut cleaned = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let tag: String = chars.by_ref().take_while(|&t| t != '>').collect();
                match tag.trim().to_ascii_lowercase().as_str() {
                    "i" => hints.italic = true,
                    "b" => hints.bold = true,
                    _ => {}
                }
            }
            '{' => {
                let block: String = chars.by_ref().take_while(|&t| t != '}').collect();
                if let Some(alignment) = parse_alignment(&block) {
                    hints.alignment = Some(alignment);
                }
            }
            '\r' => {}
            _ => cleaned.push(c),
        }
    }

    let lines = cleaned
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .map(str::to_string)
        .collect();

    (lines, hints)
}

/// Extract `\anN` from an override block body.
pub(crate) fn parse_alignment(block: &str) -> Option<u8> {
    let start = block.find("\\an")? + 3;
    let digit = block[start..].chars().next()?.to_digit(10)?;
    (1..=9).contains(&digit).then_some(digit as u8)
}

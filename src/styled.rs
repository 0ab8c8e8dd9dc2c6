//! Styled (ASS/SSA) subtitle decoding.
//!
//! Two packet layouts start a fresh caption:
//!
//! - a full script line, `Dialogue: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text`,
//!   whose own start and end times are used;
//! - a Matroska block, `ReadOrder,Layer,Style,Name,MarginL,MarginR,MarginV,Effect,Text`,
//!   timed by the packet.
//!
//! A packet with neither header continues the current caption and is
//! merged into it by the reconciler.

use std::time::Duration;

use crate::decoder::Decoded;
use crate::error::OverlayError;
use crate::event::{EndTime, OverlayEvent, RenderableOverlay, SequenceId, SourceKind, StyleHints};
use crate::packet::RawPacket;
use crate::text::parse_alignment;
use crate::utilities::parse_timestamp;

const DIALOGUE_PREFIX: &str = "Dialogue:";
const DIALOGUE_FIELDS: usize = 10;
const BLOCK_FIELDS: usize = 9;

/// Decoder for ASS/SSA subtitle packets.
#[derive(Debug)]
pub struct StyledTextDecoder {
    next_caption: u64,
    /// The caption continuation packets attach to.
    current: Option<SequenceId>,
    max_lines: usize,
}

impl StyledTextDecoder {
    /// Create a decoder.
    pub fn new(max_lines: usize) -> Self {
        Self {
            next_caption: 1,
            current: None,
            max_lines: max_lines.max(1),
        }
    }

    /// Decode one packet.
    ///
    /// # Errors
    ///
    /// [`OverlayError::MalformedPacket`] for a `Dialogue:` line with fewer
    /// than ten fields.
    pub fn decode(&mut self, packet: &RawPacket) -> Result<Vec<Decoded>, OverlayError> {
        let raw = String::from_utf8_lossy(&packet.bytes);
        let line = raw.trim_end_matches('\0').trim_matches(['\r', '\n']);

        let Some(header) = parse_header(line, packet)? else {
            return Ok(self.continuation(line, packet));
        };

        let (lines, mut style_hints) = convert_text(header.text, self.max_lines);
        if lines.is_empty() {
            self.current = None;
            return Ok(vec![Decoded::Clear {
                kind: SourceKind::StyledText,
                at: header.start_time,
            }]);
        }

        style_hints.style = Some(header.style.to_string()).filter(|s| !s.is_empty());
        style_hints.layer = header.layer;
        style_hints.margins = header.margins;

        let sequence_id = SequenceId::new(self.next_caption);
        self.next_caption += 1;
        self.current = Some(sequence_id);

        Ok(vec![Decoded::Overlay(OverlayEvent {
            source_kind: SourceKind::StyledText,
            payload: RenderableOverlay::Text { lines, style_hints },
            start_time: header.start_time,
            end_time: header.end_time,
            sequence_id,
        })])
    }

    /// Forget the current caption so stray continuations are dropped.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn continuation(&mut self, text: &str, packet: &RawPacket) -> Vec<Decoded> {
        let Some(current) = self.current else {
            log::debug!(
                "Dropping styled continuation at {:?}: no caption in progress",
                packet.timestamp
            );
            return Vec::new();
        };

        let (lines, style_hints) = convert_text(text, self.max_lines);
        if lines.is_empty() {
            return Vec::new();
        }

        let sequence_id = SequenceId::fragment(current.caption, current.fragment + 1);
        self.current = Some(sequence_id);

        vec![Decoded::Overlay(OverlayEvent {
            source_kind: SourceKind::StyledText,
            payload: RenderableOverlay::Text { lines, style_hints },
            start_time: packet.timestamp,
            end_time: packet.duration.map(|d| packet.timestamp.saturating_add(d)).into(),
            sequence_id,
        })]
    }
}

struct Header<'a> {
    layer: i32,
    style: &'a str,
    margins: Option<(u32, u32, u32)>,
    start_time: Duration,
    end_time: EndTime,
    text: &'a str,
}

/// Recognise a fresh caption header. `Ok(None)` means continuation.
fn parse_header<'a>(line: &'a str, packet: &RawPacket) -> Result<Option<Header<'a>>, OverlayError> {
    let packet_end: EndTime = packet.duration.map(|d| packet.timestamp.saturating_add(d)).into();

    if let Some(rest) = line.strip_prefix(DIALOGUE_PREFIX) {
        let fields: Vec<&str> = rest.trim_start().splitn(DIALOGUE_FIELDS, ',').collect();
        if fields.len() < DIALOGUE_FIELDS {
            return Err(OverlayError::malformed(
                SourceKind::StyledText,
                format!(
                    "dialogue line has {} of {DIALOGUE_FIELDS} fields",
                    fields.len()
                ),
            ));
        }

        let start_time = parse_timestamp(fields[1]).unwrap_or(packet.timestamp);
        let end_time = parse_timestamp(fields[2]).map_or(packet_end, EndTime::At);

        return Ok(Some(Header {
            layer: fields[0].trim().parse().unwrap_or(0),
            style: fields[3].trim(),
            margins: parse_margins(&fields[5..8]),
            start_time,
            end_time,
            text: fields[9],
        }));
    }

    let fields: Vec<&str> = line.splitn(BLOCK_FIELDS, ',').collect();
    let is_block = fields.len() == BLOCK_FIELDS
        && fields[0].trim().parse::<u64>().is_ok()
        && fields[1].trim().parse::<i32>().is_ok();
    if !is_block {
        return Ok(None);
    }

    Ok(Some(Header {
        layer: fields[1].trim().parse().unwrap_or(0),
        style: fields[2].trim(),
        margins: parse_margins(&fields[4..7]),
        start_time: packet.timestamp,
        end_time: packet_end,
        text: fields[8],
    }))
}

fn parse_margins(fields: &[&str]) -> Option<(u32, u32, u32)> {
    let left = fields.first()?.trim().parse().ok()?;
    let right = fields.get(1)?.trim().parse().ok()?;
    let vertical = fields.get(2)?.trim().parse().ok()?;
    Some((left, right, vertical)).filter(|margins| *margins != (0, 0, 0))
}

/// Turn ASS text into display lines plus the hints found in its override
/// blocks.
pub(crate) fn convert_text(text: &str, max_lines: usize) -> (Vec<String>, StyleHints) {
    let mut hints = StyleHints::default();
    let stripped = strip_ass_tags(text, &mut hints);

    let lines = stripped
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .map(str::to_string)
        .collect();

    (lines, hints)
}

/// Strip ASS/SSA override blocks and expand escapes.
///
/// Removes `{\...}` override blocks (recording alignment, italic and bold
/// overrides in `hints`), turns `\N` and `\n` into line breaks and `\h`
/// into a space.
pub(crate) fn strip_ass_tags(input: &str, hints: &mut StyleHints) -> String {
    let mut result = String::with_capacity(input.len());
    let mut block = String::new();
    let mut in_tag = false;

    for c in input.chars() {
        if c == '{' && !in_tag {
            in_tag = true;
            block.clear();
        } else if c == '}' && in_tag {
            in_tag = false;
            apply_override(&block, hints);
        } else if in_tag {
            block.push(c);
        } else {
            result.push(c);
        }
    }

    result
        .replace("\\N", "\n")
        .replace("\\n", "\n")
        .replace("\\h", " ")
}

fn apply_override(block: &str, hints: &mut StyleHints) {
    if let Some(alignment) = parse_alignment(block) {
        hints.alignment = Some(alignment);
    }
    for tag in block.split('\\') {
        match tag.trim() {
            "i1" => hints.italic = true,
            "i0" => hints.italic = false,
            "b1" => hints.bold = true,
            "b0" => hints.bold = false,
            _ => {}
        }
    }
}

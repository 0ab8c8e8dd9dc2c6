//! DVB teletext subtitle decoding.
//!
//! A teletext PES payload starts with a data identifier byte, followed by
//! data units of 46 bytes: unit id, unit length (`0x2c`), field/line byte,
//! framing code, two Hamming 8/4 address bytes and 40 data bytes. All bytes
//! are transmitted least-significant bit first.
//!
//! Row 0 of a magazine is the page header and carries the page number.
//! Rows 1..=23 carry odd-parity text. A page is complete when the next
//! header of the same magazine arrives; the decoder then emits the page's
//! text as one teletext event, or a clear if the page is blank.

use std::time::Duration;

use crate::decoder::Decoded;
use crate::error::OverlayError;
use crate::event::{EndTime, OverlayEvent, RenderableOverlay, SequenceId, SourceKind, StyleHints};
use crate::packet::RawPacket;

/// Size of one data unit including id and length bytes.
pub const DATA_UNIT_LEN: usize = 46;

/// Framing code as stored in the PES payload.
pub const FRAMING_CODE: u8 = 0xe4;

/// Number of text rows on a page, not counting the header.
const TEXT_ROWS: usize = 23;

/// Data unit ids carrying teletext (non-subtitle and subtitle).
const TELETEXT_UNIT_IDS: [u8; 2] = [0x02, 0x03];

/// Hamming 8/4 encode a nibble into its transmitted (bit-reversed) form.
pub fn encode_hamming_8_4(nibble: u8) -> u8 {
    let d1 = nibble & 1;
    let d2 = (nibble >> 1) & 1;
    let d3 = (nibble >> 2) & 1;
    let d4 = (nibble >> 3) & 1;

    let p1 = 1 ^ d1 ^ d3 ^ d4;
    let p2 = 1 ^ d1 ^ d2 ^ d4;
    let p3 = 1 ^ d1 ^ d2 ^ d3;

    let mut byte = p1 | (d1 << 1) | (p2 << 2) | (d2 << 3) | (p3 << 4) | (d3 << 5) | (d4 << 7);
    if byte.count_ones() % 2 == 0 {
        byte |= 1 << 6;
    }
    byte.reverse_bits()
}

/// Decode a transmitted Hamming 8/4 byte.
///
/// Returns `None` if any of the three protected parity checks fails.
pub fn decode_hamming_8_4(byte: u8) -> Option<u8> {
    let b = byte.reverse_bits();
    let bit = |n: u8| (b >> n) & 1;
    let (p1, d1, p2, d2, p3, d3) = (bit(0), bit(1), bit(2), bit(3), bit(4), bit(5));
    let d4 = bit(7);

    let a = p1 ^ d1 ^ d3 ^ d4;
    let b2 = p2 ^ d1 ^ d2 ^ d4;
    let c = p3 ^ d1 ^ d2 ^ d3;
    if a & b2 & c != 1 {
        return None;
    }

    Some(d1 | (d2 << 1) | (d3 << 2) | (d4 << 3))
}

/// Encode a 7-bit character with odd parity, in transmitted form.
pub fn encode_odd_parity(ch: u8) -> u8 {
    let ch = ch & 0x7f;
    let byte = if ch.count_ones() % 2 == 0 { ch | 0x80 } else { ch };
    byte.reverse_bits()
}

/// Decode a transmitted odd-parity character; `None` on a parity error.
pub fn decode_odd_parity(byte: u8) -> Option<u8> {
    let b = byte.reverse_bits();
    (b.count_ones() % 2 == 1).then_some(b & 0x7f)
}

/// A page being received.
#[derive(Debug, Clone)]
struct PageBuffer {
    rows: Vec<String>,
}

impl PageBuffer {
    fn blank() -> Self {
        Self {
            rows: vec![String::new(); TEXT_ROWS + 1],
        }
    }

    fn lines(&self) -> Vec<String> {
        self.rows[1..]
            .iter()
            .map(|row| row.trim())
            .filter(|row| !row.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Decoder for DVB teletext subtitle pages.
#[derive(Debug)]
pub struct TeletextDecoder {
    page: u16,
    receiving: Option<PageBuffer>,
    /// Rows of the last completed page, carried over when the next page
    /// does not set the erase flag.
    previous: PageBuffer,
    /// Text of the last emitted page; `None` when blank.
    last_emitted: Option<Vec<String>>,
    next_caption: u64,
}

impl TeletextDecoder {
    /// Create a decoder for `page` (e.g. `0x888`).
    pub fn new(page: u16) -> Self {
        Self {
            page,
            receiving: None,
            previous: PageBuffer::blank(),
            last_emitted: None,
            next_caption: 1,
        }
    }

    /// The page being decoded.
    pub fn page(&self) -> u16 {
        self.page
    }

    /// Switch to another page. Any page in progress is discarded.
    pub fn set_page(&mut self, page: u16) {
        if page != self.page {
            log::debug!("Switching teletext page {:03x} -> {page:03x}", self.page);
            self.page = page;
            self.reset();
        }
    }

    /// Discard pages in progress and forget the last page's rows.
    pub fn reset(&mut self) {
        self.receiving = None;
        self.previous = PageBuffer::blank();
        self.last_emitted = None;
    }

    /// Decode one PES payload.
    ///
    /// # Errors
    ///
    /// [`OverlayError::MalformedPacket`] if the payload is empty.
    pub fn decode(&mut self, packet: &RawPacket) -> Result<Vec<Decoded>, OverlayError> {
        if packet.bytes.is_empty() {
            return Err(OverlayError::malformed(
                SourceKind::Teletext,
                "missing data identifier",
            ));
        }

        let mut output = Vec::new();
        let mut offset = 1;
        while packet.bytes.len().saturating_sub(offset) >= DATA_UNIT_LEN {
            let unit_id = packet.bytes[offset];
            let length = usize::from(packet.bytes[offset + 1]);
            let body = &packet.bytes[offset + 2..offset + DATA_UNIT_LEN];

            if TELETEXT_UNIT_IDS.contains(&unit_id) && length == DATA_UNIT_LEN - 2 {
                if let Some(decoded) = self.decode_unit(body, packet.timestamp) {
                    output.push(decoded);
                }
            }
            offset += length + 2;
            if offset >= packet.bytes.len() {
                break;
            }
        }

        Ok(output)
    }

    fn decode_unit(&mut self, unit: &[u8], timestamp: Duration) -> Option<Decoded> {
        if unit[1] != FRAMING_CODE {
            log::trace!("Skipping teletext unit with framing code 0x{:02x}", unit[1]);
            return None;
        }

        let (Some(address0), Some(address1)) =
            (decode_hamming_8_4(unit[2]), decode_hamming_8_4(unit[3]))
        else {
            log::debug!("Uncorrectable teletext address at {timestamp:?}");
            return None;
        };

        let magazine = match address0 & 0x7 {
            0 => 8,
            m => u16::from(m),
        };
        let row = usize::from((address0 >> 3) | (address1 << 1));
        let data = &unit[4..];

        if magazine != self.page >> 8 {
            return None;
        }

        if row == 0 {
            return self.on_header(magazine, data, timestamp);
        }

        if row <= TEXT_ROWS {
            if let Some(page) = self.receiving.as_mut() {
                page.rows[row] = decode_text(data);
            }
        }
        None
    }

    fn on_header(&mut self, magazine: u16, data: &[u8], timestamp: Duration) -> Option<Decoded> {
        let completed = self.receiving.take().and_then(|page| self.complete(page, timestamp));

        let (Some(units), Some(tens)) = (decode_hamming_8_4(data[0]), decode_hamming_8_4(data[1]))
        else {
            log::debug!("Uncorrectable teletext page number at {timestamp:?}");
            return completed;
        };
        let erase = decode_hamming_8_4(data[3]).is_some_and(|s2| s2 & 0x8 != 0);
        let page_number = (magazine << 8) | (u16::from(tens) << 4) | u16::from(units);

        if page_number == self.page {
            log::trace!("Receiving teletext page {page_number:03x} (erase: {erase})");
            self.receiving = Some(if erase {
                PageBuffer::blank()
            } else {
                self.previous.clone()
            });
        }

        completed
    }

    fn complete(&mut self, page: PageBuffer, at: Duration) -> Option<Decoded> {
        let lines = page.lines();
        self.previous = page;

        let current = (!lines.is_empty()).then_some(lines);
        if current == self.last_emitted {
            return None;
        }
        self.last_emitted = current.clone();

        match current {
            None => Some(Decoded::Clear {
                kind: SourceKind::Teletext,
                at,
            }),
            Some(lines) => {
                let sequence_id = SequenceId::new(self.next_caption);
                self.next_caption += 1;
                Some(Decoded::Overlay(OverlayEvent {
                    source_kind: SourceKind::Teletext,
                    payload: RenderableOverlay::Text {
                        lines,
                        style_hints: StyleHints::default(),
                    },
                    start_time: at,
                    end_time: EndTime::Unknown,
                    sequence_id,
                }))
            }
        }
    }
}

/// Decode 40 odd-parity bytes into a row of text.
///
/// Control characters and parity errors become spaces.
fn decode_text(data: &[u8]) -> String {
    data.iter()
        .map(|&byte| match decode_odd_parity(byte) {
            Some(ch) if (0x20..0x7f).contains(&ch) => char::from(ch),
            _ => ' ',
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}

//! DVD subpicture (VOBSUB/SPU) assembly and parsing.
//!
//! A subpicture unit spans one or more packets. The first two bytes of the
//! first packet give the total unit size; packets are accumulated until
//! that many bytes have arrived. The unit is then parsed:
//!
//! - bytes 2..4 hold the offset of the first control sequence;
//! - each control sequence starts with a date (in units of 1024 ticks of
//!   the 90 kHz clock) and the offset of the next sequence, followed by
//!   commands terminated by `0xff`;
//! - the image is stored as two interlaced fields of 2-bit run-length
//!   encoded pixels.
//!
//! The control sequences become a schedule of [`SubpictureCommand`]s that
//! the [`BitmapLifecycle`](crate::BitmapLifecycle) applies on heartbeat.

use std::sync::Arc;
use std::time::Duration;

use crate::error::OverlayError;
use crate::event::{OverlayRect, PaletteEntry, SourceKind};
use crate::packet::RawPacket;
use crate::utilities::{duration_from_90khz, read_be16};

/// Upper bound on control sequences per unit; a longer chain is corrupt.
const MAX_CONTROL_SEQUENCES: usize = 64;

/// What a subpicture command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubpictureAction {
    /// Make the subpicture visible.
    Show,
    /// Hide the subpicture.
    Hide,
    /// Replace the subpicture's palette while it is visible.
    SetPalette([PaletteEntry; 4]),
}

/// A timed subpicture command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpictureCommand {
    /// Presentation time at which the command takes effect.
    pub at: Duration,
    /// The command itself.
    pub action: SubpictureAction,
}

/// The decoded image of a subpicture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpictureImage {
    /// One colour index (0..=3) per pixel.
    pub pixels: Arc<[u8]>,
    /// Initial RGBA palette.
    pub palette: [PaletteEntry; 4],
    /// Placement on the video frame.
    pub rect: OverlayRect,
}

/// A fully assembled subpicture and its display schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpicture {
    /// Per-source counter; later subpictures replace earlier ones.
    pub sequence_id: u64,
    /// Presentation timestamp of the unit's first packet.
    pub timestamp: Duration,
    /// Shown even when subtitles are otherwise off.
    pub forced: bool,
    /// The image to show.
    pub image: SubpictureImage,
    /// Show/hide/palette commands in time order.
    pub commands: Vec<SubpictureCommand>,
}

/// Accumulates subpicture packets and parses complete units.
#[derive(Debug)]
pub struct SubpictureAssembler {
    buffer: Vec<u8>,
    expected: usize,
    timestamp: Duration,
    next_sequence: u64,
    colour_table: [u32; 16],
}

impl SubpictureAssembler {
    /// Create an assembler using a 16-entry `0xRRGGBB` colour table.
    pub fn new(colour_table: [u32; 16]) -> Self {
        Self {
            buffer: Vec::new(),
            expected: 0,
            timestamp: Duration::ZERO,
            next_sequence: 1,
            colour_table,
        }
    }

    /// Feed one packet.
    ///
    /// Returns `Ok(None)` while the unit is still incomplete.
    ///
    /// # Errors
    ///
    /// [`OverlayError::MalformedPacket`] if the unit header is truncated or
    /// the assembled unit cannot be parsed. The partial unit is discarded.
    pub fn push(&mut self, packet: &RawPacket) -> Result<Option<Subpicture>, OverlayError> {
        if self.buffer.is_empty() {
            let Some(size) = read_be16(&packet.bytes, 0) else {
                return Err(OverlayError::malformed(
                    SourceKind::Bitmap,
                    "truncated subpicture header",
                ));
            };
            if size < 4 {
                return Err(OverlayError::malformed(
                    SourceKind::Bitmap,
                    format!("subpicture size {size} is too small"),
                ));
            }
            self.expected = size as usize;
            self.timestamp = packet.timestamp;
        }

        self.buffer.extend_from_slice(&packet.bytes);
        if self.buffer.len() < self.expected {
            log::trace!(
                "Assembling subpicture: {}/{} bytes",
                self.buffer.len(),
                self.expected
            );
            return Ok(None);
        }

        if self.buffer.len() > self.expected {
            log::warn!(
                "Found {} bytes of subpicture data, wanted {}",
                self.buffer.len(),
                self.expected
            );
            self.buffer.truncate(self.expected);
        }

        let unit = std::mem::take(&mut self.buffer);
        let sequence_id = self.next_sequence;
        self.next_sequence += 1;

        parse_unit(&unit, self.timestamp, sequence_id, &self.colour_table).map(Some)
    }

    /// Whether a unit is partially assembled.
    pub fn is_assembling(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Discard any partially assembled unit.
    pub fn reset(&mut self) {
        if self.is_assembling() {
            log::debug!(
                "Discarding partial subpicture ({}/{} bytes)",
                self.buffer.len(),
                self.expected
            );
        }
        self.buffer.clear();
        self.expected = 0;
    }
}

fn malformed(reason: impl Into<String>) -> OverlayError {
    OverlayError::malformed(SourceKind::Bitmap, reason)
}

/// Parse a complete subpicture unit.
fn parse_unit(
    data: &[u8],
    base_time: Duration,
    sequence_id: u64,
    colour_table: &[u32; 16],
) -> Result<Subpicture, OverlayError> {
    let first_control = read_be16(data, 2)
        .map(usize::from)
        .ok_or_else(|| malformed("missing control offset"))?;
    if first_control < 4 || first_control + 4 > data.len() {
        return Err(malformed(format!(
            "control offset is 0x{first_control:x}, but unit is only 0x{:x} bytes",
            data.len()
        )));
    }

    let mut palette = [3u8, 2, 1, 0];
    let mut alpha = [0u8, 15, 15, 15];
    let mut rect = None;
    let mut rle_offsets = None;
    let mut forced = false;
    let mut commands = Vec::new();

    let mut initial_palette = None;

    let mut control_offset = first_control;
    for sequence_index in 0..MAX_CONTROL_SEQUENCES {
        let date = read_be16(data, control_offset).ok_or_else(|| malformed("truncated date"))?;
        let next = read_be16(data, control_offset + 2)
            .map(usize::from)
            .ok_or_else(|| malformed("truncated next offset"))?;
        let at = base_time.saturating_add(duration_from_90khz(u64::from(date) * 1024));

        let mut position = control_offset + 4;
        let mut colours_changed = false;
        loop {
            let command = *data
                .get(position)
                .ok_or_else(|| malformed("control sequence runs past end of unit"))?;
            position += 1;

            match command {
                0x00 => {
                    forced = true;
                    commands.push(SubpictureCommand {
                        at,
                        action: SubpictureAction::Show,
                    });
                }
                0x01 => commands.push(SubpictureCommand {
                    at,
                    action: SubpictureAction::Show,
                }),
                0x02 => commands.push(SubpictureCommand {
                    at,
                    action: SubpictureAction::Hide,
                }),
                0x03 => {
                    palette = read_nibbles(data, position)?;
                    position += 2;
                    colours_changed = true;
                }
                0x04 => {
                    alpha = read_nibbles(data, position)?;
                    position += 2;
                    colours_changed = true;
                }
                0x05 => {
                    rect = Some(read_coordinates(data, position)?);
                    position += 6;
                }
                0x06 => {
                    let top = read_be16(data, position).ok_or_else(|| malformed("truncated RLE offsets"))?;
                    let bottom =
                        read_be16(data, position + 2).ok_or_else(|| malformed("truncated RLE offsets"))?;
                    rle_offsets = Some((usize::from(top), usize::from(bottom)));
                    position += 4;
                }
                0xff => break,
                other => {
                    log::warn!("Unsupported subpicture command 0x{other:02x}, skipping sequence");
                    break;
                }
            }
        }

        if sequence_index == 0 {
            initial_palette = Some(compose_palette(palette, alpha, colour_table));
        } else if colours_changed {
            commands.push(SubpictureCommand {
                at,
                action: SubpictureAction::SetPalette(compose_palette(palette, alpha, colour_table)),
            });
        }

        if next == control_offset {
            break;
        }
        if next < control_offset {
            return Err(malformed("control offset went backwards"));
        }
        control_offset = next;
    }

    let rect = rect.ok_or_else(|| malformed("no coordinates for subpicture"))?;
    let (top, bottom) = rle_offsets.ok_or_else(|| malformed("no RLE offsets for subpicture"))?;

    if !commands
        .iter()
        .any(|command| command.action == SubpictureAction::Show)
    {
        log::debug!("Subpicture {sequence_id} has no start command, showing at {base_time:?}");
        commands.insert(
            0,
            SubpictureCommand {
                at: base_time,
                action: SubpictureAction::Show,
            },
        );
    }
    commands.sort_by_key(|command| command.at);

    // The second field often overlaps the first bytes of the control block.
    let rle_end = (first_control + 2).min(data.len());
    let pixels = decode_rle(data, [top, bottom], rle_end, rect.width, rect.height)?;

    let palette = initial_palette.unwrap_or_else(|| compose_palette(palette, alpha, colour_table));

    Ok(Subpicture {
        sequence_id,
        timestamp: base_time,
        forced,
        image: SubpictureImage {
            pixels: pixels.into(),
            palette,
            rect,
        },
        commands,
    })
}

/// Read four 4-bit values; the first nibble belongs to colour index 3.
fn read_nibbles(data: &[u8], position: usize) -> Result<[u8; 4], OverlayError> {
    let bytes = data
        .get(position..position + 2)
        .ok_or_else(|| malformed("truncated palette command"))?;
    Ok([
        bytes[1] & 0x0f,
        bytes[1] >> 4,
        bytes[0] & 0x0f,
        bytes[0] >> 4,
    ])
}

/// Read x1, x2, y1, y2 as four 12-bit values (right and bottom inclusive).
fn read_coordinates(data: &[u8], position: usize) -> Result<OverlayRect, OverlayError> {
    let b = data
        .get(position..position + 6)
        .ok_or_else(|| malformed("truncated coordinates command"))?;
    let x1 = (u32::from(b[0]) << 4) | (u32::from(b[1]) >> 4);
    let x2 = (u32::from(b[1] & 0x0f) << 8) | u32::from(b[2]);
    let y1 = (u32::from(b[3]) << 4) | (u32::from(b[4]) >> 4);
    let y2 = (u32::from(b[4] & 0x0f) << 8) | u32::from(b[5]);

    if x2 < x1 || y2 < y1 {
        return Err(malformed(format!(
            "inverted coordinates ({x1},{y1})-({x2},{y2})"
        )));
    }

    Ok(OverlayRect {
        x: x1,
        y: y1,
        width: x2 + 1 - x1,
        height: y2 + 1 - y1,
    })
}

/// Map the four colour indices to RGBA through the colour table.
fn compose_palette(palette: [u8; 4], alpha: [u8; 4], colour_table: &[u32; 16]) -> [PaletteEntry; 4] {
    let mut entries = [[0u8; 4]; 4];
    for (index, entry) in entries.iter_mut().enumerate() {
        let rgb = colour_table[usize::from(palette[index] & 0x0f)];
        *entry = [
            (rgb >> 16) as u8,
            (rgb >> 8) as u8,
            rgb as u8,
            (alpha[index] & 0x0f) * 17,
        ];
    }
    entries
}

/// Reads 4-bit values from a byte slice.
struct NibbleReader<'a> {
    data: &'a [u8],
    /// Position in nibbles.
    position: usize,
    /// End of readable data in bytes.
    end: usize,
}

impl<'a> NibbleReader<'a> {
    fn new(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            data,
            position: start * 2,
            end,
        }
    }

    fn next(&mut self) -> Result<u16, OverlayError> {
        let byte_index = self.position / 2;
        if byte_index >= self.end {
            return Err(malformed("RLE data overruns its field"));
        }
        let byte = self.data[byte_index];
        let nibble = if self.position % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        };
        self.position += 1;
        Ok(u16::from(nibble))
    }

    /// Read one run: returns (length, colour). A zero length means "to the
    /// end of the line".
    fn run(&mut self) -> Result<(u32, u8), OverlayError> {
        let mut value = self.next()?;
        if value < 0x4 {
            value = (value << 4) | self.next()?;
            if value < 0x10 {
                value = (value << 4) | self.next()?;
                if value < 0x40 {
                    value = (value << 4) | self.next()?;
                }
            }
        }
        Ok((u32::from(value >> 2), (value & 0x3) as u8))
    }

    fn align(&mut self) {
        self.position += self.position % 2;
    }
}

/// Decode both interlaced fields into one colour index per pixel.
fn decode_rle(
    data: &[u8],
    field_offsets: [usize; 2],
    end: usize,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, OverlayError> {
    let width = width as usize;
    let height = height as usize;
    let mut pixels = vec![0u8; width * height];

    for (field, &offset) in field_offsets.iter().enumerate() {
        if offset >= end {
            return Err(malformed(format!(
                "RLE field offset 0x{offset:x} beyond data end 0x{end:x}"
            )));
        }
        let mut reader = NibbleReader::new(data, offset, end);

        for row in (field..height).step_by(2) {
            let mut x = 0;
            while x < width {
                let (length, colour) = reader.run()?;
                let remaining = width - x;
                let length = match length as usize {
                    0 => remaining,
                    n => n.min(remaining),
                };
                let row_start = row * width + x;
                pixels[row_start..row_start + length].fill(colour);
                x += length;
            }
            reader.align();
        }
    }

    Ok(pixels)
}

//! Dispatch from raw packets to the source-type decoders.

use std::time::Duration;

use crate::configuration::EngineOptions;
use crate::error::OverlayError;
use crate::event::{OverlayEvent, SourceKind};
use crate::packet::{PacketKind, RawPacket};
use crate::styled::StyledTextDecoder;
use crate::subpicture::{Subpicture, SubpictureAssembler};
use crate::teletext::TeletextDecoder;
use crate::text::{PlainTextDecoder, TextFraming};

/// Output of a decoder for one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A timed overlay for the reconciler.
    Overlay(OverlayEvent),
    /// An explicit "clear this kind's slot" signal.
    Clear {
        /// Which kind of source is clearing.
        kind: SourceKind,
        /// When the clear takes effect.
        at: Duration,
    },
    /// A fully assembled bitmap subpicture for the lifecycle manager.
    Subpicture(Subpicture),
}

impl Decoded {
    /// The source kind this output belongs to.
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Decoded::Overlay(event) => event.source_kind,
            Decoded::Clear { kind, .. } => *kind,
            Decoded::Subpicture(_) => SourceKind::Bitmap,
        }
    }
}

/// One decoder per source type, owned by a single packet source.
///
/// Decoders keep their sequence counters for the lifetime of the set;
/// [`reset_assembly`](Self::reset_assembly) only drops partial state.
#[derive(Debug)]
pub struct DecoderSet {
    plain: PlainTextDecoder,
    styled: StyledTextDecoder,
    subpicture: SubpictureAssembler,
    teletext: TeletextDecoder,
}

impl DecoderSet {
    /// Build decoders from engine options.
    pub fn new(options: &EngineOptions) -> Self {
        Self {
            plain: PlainTextDecoder::new(options.max_text_lines, options.unknown_text_end),
            styled: StyledTextDecoder::new(options.max_text_lines),
            subpicture: SubpictureAssembler::new(options.subpicture_palette),
            teletext: TeletextDecoder::new(options.teletext_page),
        }
    }

    /// Decode one packet with the decoder its type tag selects.
    ///
    /// An empty result means the packet was consumed without producing
    /// output yet (e.g. part of a multi-packet subpicture).
    ///
    /// # Errors
    ///
    /// [`OverlayError::UnknownSourceKind`] for an unrecognised type tag, or
    /// [`OverlayError::MalformedPacket`] from the decoder.
    pub fn decode(&mut self, packet: &RawPacket) -> Result<Vec<Decoded>, OverlayError> {
        match packet.kind()? {
            PacketKind::Text => self.plain.decode(packet, TextFraming::Raw),
            PacketKind::MovText => self.plain.decode(packet, TextFraming::LengthPrefixed),
            PacketKind::Ass => self.styled.decode(packet),
            PacketKind::VobSub => Ok(self
                .subpicture
                .push(packet)?
                .map(Decoded::Subpicture)
                .into_iter()
                .collect()),
            PacketKind::Teletext => self.teletext.decode(packet),
        }
    }

    /// Drop partial multi-packet state after a discontinuity.
    pub fn reset_assembly(&mut self) {
        self.styled.reset();
        self.subpicture.reset();
        self.teletext.reset();
    }

    /// Drop partial state of one kind's decoder.
    pub fn reset_kind(&mut self, kind: SourceKind) {
        match kind {
            SourceKind::PlainText => {}
            SourceKind::StyledText => self.styled.reset(),
            SourceKind::Bitmap => self.subpicture.reset(),
            SourceKind::Teletext => self.teletext.reset(),
        }
    }

    /// Select a different teletext page.
    pub fn set_teletext_page(&mut self, page: u16) {
        self.teletext.set_page(page);
    }
}
